//! Proxy-granting and proxy ticket flows.

use sso_core::TicketError;
use sso_ticket::{Service, TicketKind};

use crate::common::{TestEnv, APP, BACKEND, PORTAL};

const MIDDLE: &str = "https://middle.example.org";

#[tokio::test]
async fn test_portal_proxies_to_backend() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, PORTAL).await;

    let pgt = env.authority.create_proxy_granting_ticket(&st).await.unwrap();
    assert_eq!(pgt.kind(), Some(TicketKind::ProxyGranting));

    // The service ticket is still redeemable by the portal.
    let portal_view = env
        .authority
        .validate_service_ticket(&st, &Service::new(PORTAL), false)
        .await
        .unwrap();
    assert!(!portal_view.is_proxied());

    let pt = env
        .authority
        .grant_proxy_ticket(&pgt, &Service::new(BACKEND))
        .await
        .unwrap();
    assert_eq!(
        env.authority.proxy_chain(&pt).await.unwrap(),
        vec![Service::new(PORTAL)]
    );

    let assertion = env
        .authority
        .validate_proxy_ticket(&pt, &Service::new(BACKEND), false)
        .await
        .unwrap();
    assert_eq!(assertion.primary_authentication().principal_id(), "alice");
    assert_eq!(assertion.proxied_by(), &[Service::new(PORTAL)]);
    assert_eq!(assertion.chained_authentications().len(), 2);

    assert!(env
        .authority
        .validate_proxy_ticket(&pt, &Service::new(BACKEND), false)
        .await
        .unwrap_err()
        .is_invalid_ticket());
}

#[tokio::test]
async fn test_proxy_ticket_refused_by_service_validation() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, PORTAL).await;
    let pgt = env.authority.create_proxy_granting_ticket(&st).await.unwrap();
    let pt = env
        .authority
        .grant_proxy_ticket(&pgt, &Service::new(BACKEND))
        .await
        .unwrap();

    assert!(env
        .authority
        .validate_service_ticket(&pt, &Service::new(BACKEND), false)
        .await
        .unwrap_err()
        .is_invalid_ticket());
    assert!(env.exists(&pt).await);
}

#[tokio::test]
async fn test_two_level_proxy_chain() {
    let env = TestEnv::new();
    env.services.register(MIDDLE, true);

    let tgt = env.login().await;
    let st = env.grant(&tgt, PORTAL).await;
    let outer = env.authority.create_proxy_granting_ticket(&st).await.unwrap();
    let to_middle = env
        .authority
        .grant_proxy_ticket(&outer, &Service::new(MIDDLE))
        .await
        .unwrap();
    let inner = env
        .authority
        .create_proxy_granting_ticket(&to_middle)
        .await
        .unwrap();
    let to_backend = env
        .authority
        .grant_proxy_ticket(&inner, &Service::new(BACKEND))
        .await
        .unwrap();

    assert_eq!(
        env.authority.proxy_chain(&inner).await.unwrap(),
        vec![Service::new(MIDDLE), Service::new(PORTAL)]
    );

    let assertion = env
        .authority
        .validate_proxy_ticket(&to_backend, &Service::new(BACKEND), false)
        .await
        .unwrap();
    assert_eq!(
        assertion.proxied_by(),
        &[Service::new(MIDDLE), Service::new(PORTAL)]
    );
    assert_eq!(assertion.chained_authentications().len(), 3);
    assert_eq!(assertion.primary_authentication().principal_id(), "alice");
}

#[tokio::test]
async fn test_one_proxy_granting_ticket_per_service_ticket() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, PORTAL).await;

    env.authority.create_proxy_granting_ticket(&st).await.unwrap();
    assert!(env
        .authority
        .create_proxy_granting_ticket(&st)
        .await
        .unwrap_err()
        .is_invalid_ticket());
}

#[tokio::test]
async fn test_validated_ticket_cannot_back_proxying() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, PORTAL).await;
    env.authority
        .validate_service_ticket(&st, &Service::new(PORTAL), false)
        .await
        .unwrap();

    assert!(env
        .authority
        .create_proxy_granting_ticket(&st)
        .await
        .unwrap_err()
        .is_invalid_ticket());
}

#[tokio::test]
async fn test_service_without_proxy_permission() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, APP).await;

    let err = env.authority.create_proxy_granting_ticket(&st).await.unwrap_err();
    assert!(matches!(err, TicketError::UnauthorizedProxying(_)));
    assert!(env.exists(&st).await);
}

#[tokio::test]
async fn test_revoked_proxy_permission_blocks_chain() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, PORTAL).await;
    let pgt = env.authority.create_proxy_granting_ticket(&st).await.unwrap();
    let pt = env
        .authority
        .grant_proxy_ticket(&pgt, &Service::new(BACKEND))
        .await
        .unwrap();

    env.services.register(PORTAL, false);

    let err = env
        .authority
        .validate_proxy_ticket(&pt, &Service::new(BACKEND), false)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::UnauthorizedProxying(_)));
    let err = env
        .authority
        .grant_proxy_ticket(&pgt, &Service::new(BACKEND))
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::UnauthorizedProxying(_)));
}

#[tokio::test]
async fn test_proxying_ends_with_session() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, PORTAL).await;
    let pgt = env.authority.create_proxy_granting_ticket(&st).await.unwrap();

    env.authority.destroy_ticket_granting_ticket(&tgt).await.unwrap();

    assert!(env
        .authority
        .grant_proxy_ticket(&pgt, &Service::new(BACKEND))
        .await
        .unwrap_err()
        .is_invalid_ticket());
}

#[tokio::test]
async fn test_unregistered_target_is_refused() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, PORTAL).await;
    let pgt = env.authority.create_proxy_granting_ticket(&st).await.unwrap();

    let err = env
        .authority
        .grant_proxy_ticket(&pgt, &Service::new("https://evil.example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::UnauthorizedService(_)));
}
