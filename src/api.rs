//! HTTP API
//!
//! Login, thread management, uploads, history and the two chat endpoints.
//! Every route except `/login` and `/version` requires a bearer token.

mod auth;
mod handlers;
mod stream;
mod types;

pub use auth::TokenSigner;
pub use handlers::create_router;

use crate::db::Database;
use crate::turn::TurnServices;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub turns: Arc<TurnServices>,
    pub signer: Arc<TokenSigner>,
}

impl AppState {
    pub fn new(db: Database, turns: Arc<TurnServices>, signer: TokenSigner) -> Self {
        Self {
            db,
            turns,
            signer: Arc::new(signer),
        }
    }
}
