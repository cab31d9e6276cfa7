use axum::response::IntoResponse;

/// Undocumented index route; points humans at the API docs.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn root_reports_name_and_version() {
        let response = root().await.into_response();
        assert!(response.status().is_success());
    }
}
