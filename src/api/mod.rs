pub mod handlers;
pub mod server;

pub use handlers::{AppState, CounterValue};
pub use server::{build_router, load_templates, run_server, ServerConfig};
