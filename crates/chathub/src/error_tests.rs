// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    transient_io = { ChatError::TransientIO, 503 },
    queue_full = { ChatError::QueueFull, 503 },
    user_no_longer_assigned = { ChatError::UserNoLongerAssigned, 409 },
    invalid_user = { ChatError::InvalidUser, 404 },
    invalid_session = { ChatError::InvalidSession, 401 },
    invalid_action = { ChatError::InvalidAction, 400 },
    auth_failure = { ChatError::AuthFailure, 401 },
    persistence_failure = { ChatError::PersistenceFailure, 500 },
    fatal = { ChatError::Fatal, 500 },
)]
fn http_status_matches_taxonomy(error: ChatError, expected: u16) {
    assert_eq!(error.http_status(), expected);
}

#[test]
fn to_http_response_uses_the_mapped_status_and_carries_the_message() {
    let (status, body) = ChatError::AuthFailure.to_http_response("nope");
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.error.code, "AUTH_FAILURE");
    assert_eq!(body.error.message, "nope");
}
