use anyhow::Result;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::service::BridgeService;
use crate::web::routes::{self, AppState};

/// Web server instance
pub struct WebServer {
    service: Arc<BridgeService>,
}

impl WebServer {
    pub fn new(service: Arc<BridgeService>) -> Self {
        Self { service }
    }

    /// Start serving; runs until the process is stopped.
    pub async fn start(self) -> Result<()> {
        let bind_addr = self.service.config.bind_addr;
        let app_state = AppState {
            service: self.service,
        };

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = routes::create_router(app_state).layer(cors);

        println!("🌐 shellbridge listening on http://{}", bind_addr);
        println!("   terminal relay:  ws://{}/ws/terminal/{{connection_id}}", bind_addr);
        println!("   conversations:   ws://{}/ws/conversation/{{session_id}}", bind_addr);

        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
