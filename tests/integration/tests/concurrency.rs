//! Races between concurrent callers.

use std::sync::Arc;

use futures::future::join_all;
use sso_core::SsoConfig;
use sso_ticket::{Service, TicketKind};

use crate::common::{TestEnv, APP};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_service_ticket_redeemed_at_most_once() {
    let env = Arc::new(TestEnv::new());
    for _ in 0..10 {
        let tgt = env.login().await;
        let st = env.grant(&tgt, APP).await;

        let attempts = (0..16).map(|_| {
            let env = Arc::clone(&env);
            let st = st.clone();
            tokio::spawn(async move {
                env.authority
                    .validate_service_ticket(&st, &Service::new(APP), false)
                    .await
            })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(sso_core::TicketError::is_invalid_ticket));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_grants_are_all_recorded() {
    let env = Arc::new(TestEnv::with_config(&SsoConfig {
        registry_update_retries: 64,
        ..SsoConfig::default()
    }));
    let tgt = env.login().await;

    let grants = (0..24).map(|_| {
        let env = Arc::clone(&env);
        let tgt = tgt.clone();
        tokio::spawn(async move {
            env.authority
                .grant_service_ticket(&tgt, &Service::new(APP), None)
                .await
        })
    });
    let issued: Vec<_> = join_all(grants)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let session = env
        .registry()
        .get_ticket(&tgt, &[TicketKind::TicketGranting])
        .await
        .unwrap();
    assert_eq!(session.count_of_uses(), 24);
    let recorded = session.granting().unwrap().services();
    assert_eq!(recorded.len(), 24);
    for st in &issued {
        assert!(recorded.iter().any(|s| &s.ticket_id == st));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_races_logout() {
    let env = Arc::new(TestEnv::new());
    let mut sessions = Vec::new();
    for _ in 0..8 {
        let tgt = env.login().await;
        for _ in 0..3 {
            env.grant(&tgt, APP).await;
        }
        sessions.push(tgt);
    }
    env.clock.advance(std::time::Duration::from_secs(11));

    let sweeper = {
        let env = Arc::clone(&env);
        tokio::spawn(async move { env.registry().sweep().await })
    };
    let logouts = sessions.iter().cloned().map(|tgt| {
        let env = Arc::clone(&env);
        tokio::spawn(async move { env.authority.destroy_ticket_granting_ticket(&tgt).await })
    });

    for joined in join_all(logouts).await {
        joined.unwrap().unwrap();
    }
    sweeper.await.unwrap().unwrap();

    assert!(env.store.is_empty());
}
