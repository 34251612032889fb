//! Session, grant and validation flows.

use sso_authority::Credential;
use sso_core::{SsoConfig, TicketError};
use sso_ticket::{Service, TicketKind};

use crate::common::{TestEnv, APP};

#[tokio::test]
async fn test_alice_single_sign_on() {
    let env = TestEnv::new();
    let tgt = env
        .authority
        .create_ticket_granting_ticket(env.alice())
        .await
        .unwrap();
    let st = env
        .authority
        .grant_service_ticket(&tgt, &Service::new(APP), None)
        .await
        .unwrap();

    let assertion = env
        .authority
        .validate_service_ticket(&st, &Service::new(APP), false)
        .await
        .unwrap();
    assert_eq!(assertion.primary_authentication().principal_id(), "alice");
    assert_eq!(assertion.service(), &Service::new(APP));

    let err = env
        .authority
        .validate_service_ticket(&st, &Service::new(APP), false)
        .await
        .unwrap_err();
    assert!(err.is_invalid_ticket());
    assert_eq!(err.to_string(), "ticket not recognized");
}

#[tokio::test]
async fn test_service_mismatch_keeps_ticket() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, "https://a.example.org").await;

    let err = env
        .authority
        .validate_service_ticket(&st, &Service::new("https://b.example.org"), false)
        .await
        .unwrap_err();
    assert!(err.is_invalid_ticket());
    assert!(env.exists(&st).await);

    env.authority
        .validate_service_ticket(&st, &Service::new("https://a.example.org"), false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_single_sign_on_across_services() {
    let env = TestEnv::new();
    let tgt = env.login().await;

    for service in [APP, "https://a.example.org", "https://b.example.org"] {
        let st = env.grant(&tgt, service).await;
        let assertion = env
            .authority
            .validate_service_ticket(&st, &Service::new(service), false)
            .await
            .unwrap();
        assert_eq!(assertion.primary_authentication().principal_id(), "alice");
    }

    let session = env
        .registry()
        .get_ticket(&tgt, &[TicketKind::TicketGranting])
        .await
        .unwrap();
    assert_eq!(session.count_of_uses(), 3);
    assert_eq!(session.granting().unwrap().services().len(), 3);
}

#[tokio::test]
async fn test_every_login_opens_a_new_session() {
    let env = TestEnv::new();
    let first = env.login().await;
    let second = env.login().await;

    assert_ne!(first, second);
    assert_eq!(first.kind(), Some(TicketKind::TicketGranting));
    assert_eq!(env.registry().session_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_bad_credentials_open_nothing() {
    let env = TestEnv::new();
    let err = env
        .authority
        .authenticate(&Credential::new("alice", "looking-glass"))
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::Authentication(_)));
    assert_eq!(env.registry().session_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_renew_flow() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let service = Service::new(APP);

    let renewed = env
        .authority
        .grant_service_ticket(&tgt, &service, Some(&Credential::new("alice", "wonderland")))
        .await
        .unwrap();
    let assertion = env
        .authority
        .validate_service_ticket(&renewed, &service, true)
        .await
        .unwrap();
    assert!(assertion.is_from_new_login());

    let from_sso = env.grant(&tgt, APP).await;
    assert!(env
        .authority
        .validate_service_ticket(&from_sso, &service, true)
        .await
        .unwrap_err()
        .is_invalid_ticket());
}

#[tokio::test]
async fn test_mixed_principal_is_refused() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let err = env
        .authority
        .grant_service_ticket(&tgt, &Service::new(APP), Some(&Credential::new("bob", "builder")))
        .await
        .unwrap_err();
    assert_eq!(err, TicketError::MixedPrincipal);
    assert_eq!(env.registry().service_ticket_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ticket_ids_carry_node_suffix() {
    let env = TestEnv::with_config(&SsoConfig {
        ticket_id_suffix: Some("node7".to_string()),
        ..SsoConfig::default()
    });
    let tgt = env.login().await;
    let st = env.grant(&tgt, APP).await;

    for id in [&tgt, &st] {
        assert!(id.as_str().ends_with("-node7"), "{id}");
    }
    assert_eq!(st.kind(), Some(TicketKind::Service));
    env.authority
        .validate_service_ticket(&st, &Service::new(APP), false)
        .await
        .unwrap();
}
