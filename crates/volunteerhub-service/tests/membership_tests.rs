mod common;

use common::*;
use volunteerhub_core::{AggregateStore, Provider, Role};
use volunteerhub_service::identity::{self, ProviderLogin, RegisterInput};
use volunteerhub_service::membership;

#[tokio::test]
async fn bootstrap_is_idempotent_for_same_email() {
    let (_store, ctx) = new_ctx();
    let first = register(&ctx, "ada@example.com", "Ada").await;
    let second = register(&ctx, "ada@example.com", "Ada Again").await;
    assert_eq!(first.id, second.id);
    assert_eq!(second.name, "Ada");

    let via_provider = identity::login_or_create_account(
        &ctx,
        ProviderLogin {
            provider: Provider::Google,
            provider_id: "google-123".to_string(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            image: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(via_provider.id, first.id);
}

#[tokio::test]
async fn register_rejects_empty_fields() {
    let (_store, ctx) = new_ctx();
    let err = identity::register(
        &ctx,
        RegisterInput {
            email: String::new(),
            name: "X".to_string(),
            password: "pw".to_string(),
            image: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn verify_credentials_paths() {
    let (_store, ctx) = new_ctx();
    let user = register(&ctx, "bea@example.com", "Bea").await;

    let verified = identity::verify_credentials(&ctx, "bea@example.com", "correct-horse-battery")
        .await
        .unwrap();
    assert_eq!(verified.id, user.id);

    let wrong = identity::verify_credentials(&ctx, "bea@example.com", "nope")
        .await
        .unwrap_err();
    assert_eq!(wrong.status_code(), 401);

    let missing = identity::verify_credentials(&ctx, "nobody@example.com", "pw")
        .await
        .unwrap_err();
    assert_eq!(missing.status_code(), 404);
}

#[tokio::test]
async fn join_with_invite_code_creates_member_and_sets_pointer() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let joiner = register(&ctx, "vol@example.com", "Volunteer").await;

    let member = membership::join_with_invite_code(&ctx, &joiner.id, &org.invite_code)
        .await
        .unwrap();
    assert_eq!(member.role, Role::Member);

    let joiner = store.get_user(&joiner.id).await.unwrap().unwrap();
    assert_eq!(joiner.current_organization.as_deref(), Some(org.id.as_str()));
}

#[tokio::test]
async fn join_twice_conflicts_and_leaves_one_member_row() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let joiner = register(&ctx, "vol@example.com", "Volunteer").await;

    membership::join_with_invite_code(&ctx, &joiner.id, &org.invite_code)
        .await
        .unwrap();
    let err = membership::join_with_invite_code(&ctx, &joiner.id, &org.invite_code)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);

    // Owner membership plus exactly one joiner membership.
    let members = store.list_members(&org.id).await.unwrap();
    assert_eq!(members.len(), 2);
}

#[tokio::test]
async fn join_keeps_existing_pointer() {
    let (store, ctx) = new_ctx();
    let owner_a = register(&ctx, "a@example.com", "A").await;
    let owner_b = register(&ctx, "b@example.com", "B").await;
    let org_a = create_org(&ctx, &owner_a, "Org A").await;
    let org_b = create_org(&ctx, &owner_b, "Org B").await;
    let joiner = register(&ctx, "vol@example.com", "Volunteer").await;

    membership::join_with_invite_code(&ctx, &joiner.id, &org_a.invite_code)
        .await
        .unwrap();
    membership::join_with_invite_code(&ctx, &joiner.id, &org_b.invite_code)
        .await
        .unwrap();

    let joiner = store.get_user(&joiner.id).await.unwrap().unwrap();
    assert_eq!(
        joiner.current_organization.as_deref(),
        Some(org_a.id.as_str())
    );
}

#[tokio::test]
async fn owner_cannot_leave() {
    let (_store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;

    let err = membership::leave_organization(&ctx, &owner.id, &org.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn leave_repairs_pointer_to_another_membership() {
    let (store, ctx) = new_ctx();
    let owner_a = register(&ctx, "a@example.com", "A").await;
    let owner_b = register(&ctx, "b@example.com", "B").await;
    let org_a = create_org(&ctx, &owner_a, "Org A").await;
    let org_b = create_org(&ctx, &owner_b, "Org B").await;
    let joiner = register(&ctx, "vol@example.com", "Volunteer").await;

    membership::join_with_invite_code(&ctx, &joiner.id, &org_a.invite_code)
        .await
        .unwrap();
    membership::join_with_invite_code(&ctx, &joiner.id, &org_b.invite_code)
        .await
        .unwrap();

    // Pointer is org A; leaving it must re-point to the remaining
    // membership.
    membership::leave_organization(&ctx, &joiner.id, &org_a.id)
        .await
        .unwrap();
    let joiner = store.get_user(&joiner.id).await.unwrap().unwrap();
    assert_eq!(
        joiner.current_organization.as_deref(),
        Some(org_b.id.as_str())
    );
    assert!(store
        .get_member(&org_a.id, &joiner.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn ban_clears_pointer_when_no_other_membership() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let target = register(&ctx, "vol@example.com", "Volunteer").await;
    membership::join_with_invite_code(&ctx, &target.id, &org.invite_code)
        .await
        .unwrap();

    membership::ban_member(&ctx, &owner.id, &org.id, &target.id)
        .await
        .unwrap();

    let target = store.get_user(&target.id).await.unwrap().unwrap();
    assert_eq!(target.current_organization, None);
    assert!(store
        .get_member(&org.id, &target.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn ban_requires_owner_and_rejects_self() {
    let (_store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let member = register(&ctx, "vol@example.com", "Volunteer").await;
    membership::join_with_invite_code(&ctx, &member.id, &org.invite_code)
        .await
        .unwrap();

    let not_owner = membership::ban_member(&ctx, &member.id, &org.id, &owner.id)
        .await
        .unwrap_err();
    assert_eq!(not_owner.status_code(), 403);

    let self_ban = membership::ban_member(&ctx, &owner.id, &org.id, &owner.id)
        .await
        .unwrap_err();
    assert_eq!(self_ban.status_code(), 400);
}

#[tokio::test]
async fn change_member_role_paths() {
    let (_store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let member = register(&ctx, "vol@example.com", "Volunteer").await;
    membership::join_with_invite_code(&ctx, &member.id, &org.invite_code)
        .await
        .unwrap();

    let promoted = membership::change_member_role(&ctx, &owner.id, &org.id, &member.id, Role::Admin)
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Admin);

    // Admins do not hold CHANGE_MEMBER_ROLE.
    let denied = membership::change_member_role(&ctx, &member.id, &org.id, &owner.id, Role::Member)
        .await
        .unwrap_err();
    assert_eq!(denied.status_code(), 401);

    let owner_role = membership::change_member_role(&ctx, &owner.id, &org.id, &owner.id, Role::Member)
        .await
        .unwrap_err();
    assert_eq!(owner_role.status_code(), 400);
}

#[tokio::test]
async fn member_role_lookup() {
    let (_store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let outsider = register(&ctx, "out@example.com", "Outsider").await;

    assert_eq!(
        membership::member_role(&ctx, &owner.id, &org.id).await.unwrap(),
        Role::Owner
    );
    let unknown_org = membership::member_role(&ctx, &owner.id, "missing")
        .await
        .unwrap_err();
    assert_eq!(unknown_org.status_code(), 404);
    let non_member = membership::member_role(&ctx, &outsider.id, &org.id)
        .await
        .unwrap_err();
    assert_eq!(non_member.status_code(), 401);
}
