use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::not_authenticated("not_authenticated", "no token").http_status(), 401);
    assert_eq!(AppError::not_authorized("not_owner", "nope").http_status(), 403);
    assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
    assert_eq!(AppError::rate_limited("rate_limited", "slow down").http_status(), 429);
    assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn graphql_code_mapping() {
    assert_eq!(AppError::not_authenticated("a", "b").graphql_code(), "NOT_AUTHENTICATED");
    assert_eq!(AppError::not_authorized("not_admin", "b").graphql_code(), "NOT_AUTHORIZED");
    assert_eq!(AppError::not_authorized("not_owner", "b").graphql_code(), "NOT_AUTHORIZED");
    assert_eq!(AppError::rate_limited("a", "b").graphql_code(), "RATE_LIMITED");
    assert_eq!(AppError::user("a", "b").graphql_code(), "BAD_USER_INPUT");
}

#[test]
fn graphql_error_object_carries_reason() {
    let v = AppError::not_authorized("not_admin", "admin role required").to_graphql();
    assert_eq!(v["message"], "admin role required");
    assert_eq!(v["extensions"]["code"], "NOT_AUTHORIZED");
    assert_eq!(v["extensions"]["reason"], "not_admin");
}

#[test]
fn anyhow_maps_to_internal() {
    let e: AppError = anyhow::anyhow!("boom").into();
    assert_eq!(e.graphql_code(), "INTERNAL");
    assert_eq!(e.message(), "boom");
    assert_eq!(e.to_string(), "internal_error: boom");
}
