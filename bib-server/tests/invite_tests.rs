//! Integration tests for groups and invites
//!
//! Tests cover:
//! - group creation and membership visibility
//! - invite creation rules (owner only, no duplicates, no self-invites)
//! - idempotent answers and cancellation
//! - concurrent answers to the same invite

mod helpers;

use axum::http::StatusCode;
use bib_server::db::{groups, invites, InviteDecision, InviteStatus};
use helpers::*;
use serde_json::{json, Value};
use uuid::Uuid;

struct Fixture {
    app: TestApp,
    owner: (Uuid, String),
    guest: (Uuid, String),
    outsider: (Uuid, String),
    group_id: Uuid,
}

async fn fixture() -> Fixture {
    let app = create_test_app(test_config()).await;
    let owner = app.create_user("Owner").await;
    let guest = app.create_user("Guest").await;
    let outsider = app.create_user("Outsider").await;

    let (status, body) = app
        .send_json(authed_request(
            "POST",
            "/api/groups",
            &owner.1,
            Some(json!({"name": "Friday Horror"})),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = body["id"].as_str().unwrap().parse().unwrap();

    Fixture {
        app,
        owner,
        guest,
        outsider,
        group_id,
    }
}

impl Fixture {
    async fn invite(&self, token: &str, invitee: Uuid) -> (StatusCode, Value) {
        self.app
            .send_json(authed_request(
                "POST",
                "/api/invites",
                token,
                Some(json!({"group_id": self.group_id, "invitee_id": invitee})),
            ))
            .await
    }

    async fn respond(&self, token: &str, invite_id: &str, decision: &str) -> (StatusCode, Value) {
        self.app
            .send_json(authed_request(
                "POST",
                "/rpc/respond_to_invite",
                token,
                Some(json!({"invite_id": invite_id, "decision": decision})),
            ))
            .await
    }

    async fn member_ids(&self) -> Vec<String> {
        let (status, body) = self
            .app
            .send_json(authed_request(
                "GET",
                &format!("/api/groups/{}/members", self.group_id),
                &self.owner.1,
                None,
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        body.as_array()
            .unwrap()
            .iter()
            .map(|m| m["user_id"].as_str().unwrap().to_string())
            .collect()
    }
}

#[tokio::test]
async fn test_group_creator_is_owner() {
    let f = fixture().await;

    let (status, body) = f
        .app
        .send_json(authed_request(
            "GET",
            &format!("/api/groups/{}/members", f.group_id),
            &f.owner.1,
            None,
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["user_id"], f.owner.0.to_string());
    assert_eq!(body[0]["role"], "owner");
    assert_eq!(body[0]["display_name"], "Owner");
}

#[tokio::test]
async fn test_members_hidden_from_outsiders() {
    let f = fixture().await;

    let (status, _) = f
        .app
        .send_json(authed_request(
            "GET",
            &format!("/api/groups/{}/members", f.group_id),
            &f.outsider.1,
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = f
        .app
        .send_json(authed_request(
            "GET",
            &format!("/api/groups/{}/members", Uuid::new_v4()),
            &f.outsider.1,
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invite_accept_adds_membership() {
    let f = fixture().await;

    let (status, invite) = f.invite(&f.owner.1, f.guest.0).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invite["status"], "pending");
    assert_eq!(invite["inviter_id"], f.owner.0.to_string());
    let invite_id = invite["id"].as_str().unwrap().to_string();

    // Invitee sees it in their pending list
    let (status, pending) = f
        .app
        .send_json(authed_request("GET", "/api/invites?status=pending", &f.guest.1, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["id"], invite_id.as_str());

    let (status, body) = f.respond(&f.guest.1, &invite_id, "accept").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["invite_id"], invite_id.as_str());

    assert!(f.member_ids().await.contains(&f.guest.0.to_string()));

    // The group now shows up for the guest
    let (_, groups) = f
        .app
        .send_json(authed_request("GET", "/api/groups", &f.guest.1, None))
        .await;
    assert_eq!(groups[0]["id"], f.group_id.to_string());
}

#[tokio::test]
async fn test_answer_is_idempotent() {
    let f = fixture().await;
    let (_, invite) = f.invite(&f.owner.1, f.guest.0).await;
    let invite_id = invite["id"].as_str().unwrap().to_string();

    let (status, body) = f.respond(&f.guest.1, &invite_id, "reject").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    // A later accept does not flip the outcome or add a membership
    let (status, body) = f.respond(&f.guest.1, &invite_id, "accept").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert!(!f.member_ids().await.contains(&f.guest.0.to_string()));
}

#[tokio::test]
async fn test_only_invitee_may_answer() {
    let f = fixture().await;
    let (_, invite) = f.invite(&f.owner.1, f.guest.0).await;
    let invite_id = invite["id"].as_str().unwrap().to_string();

    let (status, _) = f.respond(&f.outsider.1, &invite_id, "accept").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = f.respond(&f.owner.1, &invite_id, "accept").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = f
        .respond(&f.guest.1, &Uuid::new_v4().to_string(), "accept")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = f.respond(&f.guest.1, &invite_id, "maybe").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "UNPROCESSABLE_ENTITY");
}

#[tokio::test]
async fn test_invite_creation_rules() {
    let f = fixture().await;

    // Only the owner invites
    let (status, _) = f.invite(&f.outsider.1, f.guest.0).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // No self-invites
    let (status, _) = f.invite(&f.owner.1, f.owner.0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown invitee
    let (status, _) = f.invite(&f.owner.1, Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // One pending invite per invitee
    let (status, _) = f.invite(&f.owner.1, f.guest.0).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = f.invite(&f.owner.1, f.guest.0).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_reinvite_after_rejection() {
    let f = fixture().await;
    let (_, invite) = f.invite(&f.owner.1, f.guest.0).await;
    let invite_id = invite["id"].as_str().unwrap().to_string();
    f.respond(&f.guest.1, &invite_id, "reject").await;

    let (status, second) = f.invite(&f.owner.1, f.guest.0).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(second["id"], invite["id"]);
}

#[tokio::test]
async fn test_cannot_invite_existing_member() {
    let f = fixture().await;
    let (_, invite) = f.invite(&f.owner.1, f.guest.0).await;
    f.respond(&f.guest.1, invite["id"].as_str().unwrap(), "accept")
        .await;

    let (status, _) = f.invite(&f.owner.1, f.guest.0).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_invite() {
    let f = fixture().await;
    let (_, invite) = f.invite(&f.owner.1, f.guest.0).await;
    let invite_id = invite["id"].as_str().unwrap().to_string();
    let cancel_uri = format!("/api/invites/{}/cancel", invite_id);

    // Invitee cannot cancel
    let (status, _) = f
        .app
        .send_json(authed_request("POST", &cancel_uri, &f.guest.1, None))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = f
        .app
        .send_json(authed_request("POST", &cancel_uri, &f.owner.1, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "canceled");

    // Answering a canceled invite reports the cancellation
    let (status, body) = f.respond(&f.guest.1, &invite_id, "accept").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "canceled");

    // Cancelling twice is harmless
    let (status, body) = f
        .app
        .send_json(authed_request("POST", &cancel_uri, &f.owner.1, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "canceled");
}

#[tokio::test]
async fn test_list_invites_status_filter() {
    let f = fixture().await;
    let (_, invite) = f.invite(&f.owner.1, f.guest.0).await;
    f.respond(&f.guest.1, invite["id"].as_str().unwrap(), "accept")
        .await;
    f.invite(&f.owner.1, f.outsider.0).await;

    let list = |query: &'static str| {
        let token = f.owner.1.clone();
        let app = &f.app;
        async move {
            app.send_json(authed_request("GET", &format!("/api/invites{}", query), &token, None))
                .await
        }
    };

    let (_, all) = list("").await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, accepted) = list("?status=accepted").await;
    assert_eq!(accepted.as_array().unwrap().len(), 1);
    assert_eq!(accepted[0]["invitee_id"], f.guest.0.to_string());

    let (status, _) = list("?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The outsider only sees their own invite
    let (_, outsider_view) = f
        .app
        .send_json(authed_request("GET", "/api/invites", &f.outsider.1, None))
        .await;
    assert_eq!(outsider_view.as_array().unwrap().len(), 1);
    assert_eq!(outsider_view[0]["invitee_id"], f.outsider.0.to_string());
}

#[tokio::test]
async fn test_leave_group() {
    let f = fixture().await;
    let (_, invite) = f.invite(&f.owner.1, f.guest.0).await;
    f.respond(&f.guest.1, invite["id"].as_str().unwrap(), "accept")
        .await;

    let leave_uri = format!("/api/groups/{}/leave", f.group_id);

    let (status, _) = f
        .app
        .send_json(authed_request("POST", &leave_uri, &f.owner.1, None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = f
        .app
        .send_json(authed_request("POST", &leave_uri, &f.guest.1, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!f.member_ids().await.contains(&f.guest.0.to_string()));

    let (status, _) = f
        .app
        .send_json(authed_request("POST", &leave_uri, &f.guest.1, None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_answers_resolve_once() {
    let f = fixture().await;
    let invite = invites::create_invite(&f.app.pool, f.owner.0, f.group_id, f.guest.0)
        .await
        .unwrap();

    let pool = f.app.pool.clone();
    let guest = f.guest.0;
    let accept = tokio::spawn({
        let pool = pool.clone();
        async move { invites::respond_to_invite(&pool, guest, invite.id, InviteDecision::Accept).await }
    });
    let reject = tokio::spawn({
        let pool = pool.clone();
        async move { invites::respond_to_invite(&pool, guest, invite.id, InviteDecision::Reject).await }
    });

    let accepted = accept.await.unwrap().unwrap();
    let rejected = reject.await.unwrap().unwrap();

    // Both callers observe the single winning outcome
    assert_eq!(accepted, rejected);
    let stored = invites::get_invite(&pool, invite.id).await.unwrap().unwrap();
    assert_eq!(stored.status, accepted);
    assert!(stored.responded_at.is_some());

    let member = groups::is_member(&pool, f.group_id, guest).await.unwrap();
    assert_eq!(member, accepted == InviteStatus::Accepted);
}
