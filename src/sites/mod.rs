use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::Result;
use crate::interfaces::Site;
use crate::network::context::ServiceContext;

pub mod bilinovel;

// ============================================================================
// 站点注册表
// ============================================================================

type SiteFactory = Box<dyn Fn(ServiceContext) -> Result<Arc<dyn Site>> + Send + Sync>;

pub struct SiteRegistry {
    factories: HashMap<String, SiteFactory>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("bilinovel", |ctx| {
            let site: Arc<dyn Site> = Arc::new(bilinovel::Bilinovel::new(ctx)?);
            Ok(site)
        });
        registry
    }

    pub fn register<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(ServiceContext) -> Result<Arc<dyn Site>> + Send + Sync + 'static,
    {
        self.factories.insert(id.to_string(), Box::new(factory));
    }

    /// 未注册的标识返回 `None`
    pub fn create(&self, id: &str, ctx: ServiceContext) -> Option<Result<Arc<dyn Site>>> {
        self.factories.get(id).map(|f| f(ctx))
    }

    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
