use axum::{extract::Extension, response::Redirect};

use crate::data::model::CurrentUser;

pub async fn app(Extension(current_user): Extension<Option<CurrentUser>>) -> Redirect {
    match current_user {
        Some(_) => Redirect::to("/chat"),
        None => Redirect::to("/login"),
    }
}
