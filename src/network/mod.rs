pub mod auth;
pub mod commands;
pub mod normalize;
pub mod relay;
pub mod session;
pub mod upstream;

pub use auth::{AuthState, FileAuthState};
pub use commands::CommandHandler;
pub use relay::Relay;
pub use session::{ConnectionState, Session, SessionSettings};
pub use upstream::{Upstream, WsUpstream};
