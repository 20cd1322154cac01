//! Server test utilities.

use crate::common::fixtures::{FakeTools, ToolBehavior};
use docket_core::config::ServiceConfig;
use docket_server::{AppState, create_router};
use std::sync::Arc;
use tempfile::TempDir;

/// A router wired to fake tools and a temporary staging directory.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub tools: Arc<FakeTools>,
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub fn new(behavior: ToolBehavior) -> Self {
        Self::with_config(behavior, |_| {})
    }

    pub fn with_config<F>(behavior: ToolBehavior, modifier: F) -> Self
    where
        F: FnOnce(&mut ServiceConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = ServiceConfig::for_testing(temp_dir.path().join("staging"));
        modifier(&mut config);

        let tools = Arc::new(FakeTools::new(behavior));
        let state = AppState::with_runner(config, tools.clone()).expect("valid test config");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            tools,
            temp_dir,
        }
    }

    /// Entries currently in the staging directory.
    pub fn staged_entries(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path().join("staging"))
            .map(|rd| rd.count())
            .unwrap_or(0)
    }
}
