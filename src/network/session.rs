use std::sync::Arc;

use parking_lot::RwLock;

/// 请求会话：每次请求前由 `SessionMiddleware` 注入的 UA
///
/// 章节页所需的 Cookie 与语言头随请求显式传入，见 `page_headers`。
#[derive(Debug, Default)]
pub struct Session {
    pub ua: Arc<RwLock<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ua(&self, ua: String) {
        *self.ua.write() = ua;
    }

    pub fn get_ua(&self) -> String {
        self.ua.read().clone()
    }
}
