// src/state.rs
use std::sync::Arc;

use crate::auth::JwtVerifier;
use crate::store::PollStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
    pub verifier: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(store: Arc<dyn PollStore>, verifier: JwtVerifier) -> Self {
        Self {
            store,
            verifier: Arc::new(verifier),
        }
    }
}
