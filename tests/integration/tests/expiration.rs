//! Expiration policies observed through the authority.

use std::time::Duration;

use sso_authority::Credential;
use sso_core::TicketError;
use sso_ticket::authentication::attributes;
use sso_ticket::{ExpirationPolicy, Service};

use crate::common::{TestEnv, APP};

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_service_ticket_lifetime_boundary() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let early = env.grant(&tgt, APP).await;
    let late = env.grant(&tgt, APP).await;

    env.clock.advance(Duration::from_secs(9));
    env.authority
        .validate_service_ticket(&early, &Service::new(APP), false)
        .await
        .unwrap();

    env.clock.advance(Duration::from_secs(2));
    assert!(env
        .authority
        .validate_service_ticket(&late, &Service::new(APP), false)
        .await
        .unwrap_err()
        .is_invalid_ticket());
    assert!(!env.exists(&late).await);
}

#[tokio::test]
async fn test_idle_window_slides_until_absolute_limit() {
    let env = TestEnv::new();
    let tgt = env.authority.factory().create_ticket_granting_ticket_with_policy(
        env.alice(),
        ExpirationPolicy::any_of(vec![
            ExpirationPolicy::time_to_idle(5 * MINUTE),
            ExpirationPolicy::time_to_live(120 * MINUTE),
        ]),
    );
    env.registry().add_ticket(&tgt).await.unwrap();

    // Used every 4 minutes: the idle window never lapses.
    for _ in 0..29 {
        env.clock.advance(4 * MINUTE);
        env.grant(tgt.id(), APP).await;
    }

    // 121 minutes after creation, last used 5 minutes ago.
    env.clock.advance(5 * MINUTE);
    let err = env
        .authority
        .grant_service_ticket(tgt.id(), &Service::new(APP), None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_ticket());
}

#[tokio::test]
async fn test_throttling_is_not_expiration() {
    let env = TestEnv::new();
    let tgt = env.authority.factory().create_ticket_granting_ticket_with_policy(
        env.alice(),
        ExpirationPolicy::any_of(vec![
            ExpirationPolicy::Throttled {
                min_interval: Duration::from_secs(2),
            },
            ExpirationPolicy::time_to_live(60 * MINUTE),
        ]),
    );
    env.registry().add_ticket(&tgt).await.unwrap();

    env.grant(tgt.id(), APP).await;
    env.clock.advance(Duration::from_secs(1));
    match env
        .authority
        .grant_service_ticket(tgt.id(), &Service::new(APP), None)
        .await
    {
        Err(TicketError::Throttled { retry_after, .. }) => {
            assert_eq!(retry_after, Duration::from_secs(1));
        }
        other => panic!("expected throttling, got {other:?}"),
    }

    env.clock.advance(Duration::from_secs(2));
    env.grant(tgt.id(), APP).await;
}

#[tokio::test]
async fn test_remember_me_outlives_default_session() {
    let env = TestEnv::new();
    let normal = env.login().await;
    let remembered = env
        .authority
        .authenticate(&Credential::new("alice", "wonderland").with_remember_me(true))
        .await
        .unwrap();

    env.clock.advance(9 * 60 * MINUTE);

    env.grant(&remembered, APP).await;
    assert!(env
        .authority
        .grant_service_ticket(&normal, &Service::new(APP), None)
        .await
        .unwrap_err()
        .is_invalid_ticket());
}

#[tokio::test]
async fn test_surrogate_session_has_short_idle_window() {
    let env = TestEnv::new();
    let normal = env.login().await;
    let surrogate = env
        .authority
        .create_ticket_granting_ticket(
            env.alice()
                .with_attribute(attributes::SURROGATE_PRINCIPAL, "alice")
                .with_attribute(attributes::SURROGATE_USER, "bob"),
        )
        .await
        .unwrap();

    env.clock.advance(6 * MINUTE);

    env.grant(&normal, APP).await;
    assert!(env
        .authority
        .grant_service_ticket(&surrogate, &Service::new(APP), None)
        .await
        .unwrap_err()
        .is_invalid_ticket());
}

#[tokio::test(start_paused = true)]
async fn test_background_sweep_evicts_expired_tickets() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let sts = [env.grant(&tgt, APP).await, env.grant(&tgt, APP).await];

    let sweep = env.sweep(Duration::from_secs(30), Duration::from_secs(1));
    assert!(sweep.start());

    env.clock.advance(Duration::from_secs(11));
    tokio::time::sleep(Duration::from_secs(2)).await;

    for st in &sts {
        assert!(!env.exists(st).await);
    }
    assert!(env.exists(&tgt).await);
    assert_eq!(env.registry().session_count().await.unwrap(), 1);

    sweep.stop().await;
}
