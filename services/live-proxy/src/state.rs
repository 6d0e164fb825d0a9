//! Shared state handed to every relayed connection.

use crate::{config::Config, token::TokenSource};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub token_source: Arc<dyn TokenSource>,
}
