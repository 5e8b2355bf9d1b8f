//! Version 1 API routes.

mod configurations;
mod nodes;
mod status;

use axum::Router;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/configurations", configurations::routes())
        .nest("/nodes", nodes::routes())
        .merge(status::routes())
}
