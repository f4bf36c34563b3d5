use env_logger::Env;

/// 初始化日誌；預設只輸出警告以上，避免打斷進度條，可用 `RUST_LOG` 覆寫
pub fn init() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();
}
