//! Session destruction and single logout.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use sso_authority::{notify_single_logout, LogoutRequest, LogoutSummary, NotificationError, SingleLogoutNotifier};
use sso_ticket::{Service, TicketId, TicketKind};

use crate::common::{TestEnv, APP, BACKEND, PORTAL};

#[derive(Debug, Default)]
struct RecordingNotifier {
    delivered: Mutex<Vec<LogoutRequest>>,
    unreachable: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    fn unreachable(self, service: &str) -> Self {
        self.unreachable.lock().insert(service.to_string());
        self
    }

    fn attempts(&self) -> usize {
        self.delivered.lock().len()
    }
}

#[async_trait]
impl SingleLogoutNotifier for RecordingNotifier {
    async fn notify(&self, request: &LogoutRequest) -> Result<(), NotificationError> {
        self.delivered.lock().push(request.clone());
        if self.unreachable.lock().contains(request.service.id()) {
            return Err(NotificationError {
                service: request.service.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

struct Session {
    tgt: TicketId,
    service_tickets: Vec<TicketId>,
    pgt: TicketId,
    proxy_tickets: Vec<TicketId>,
}

impl Session {
    fn all(&self) -> Vec<&TicketId> {
        std::iter::once(&self.tgt)
            .chain(&self.service_tickets)
            .chain(std::iter::once(&self.pgt))
            .chain(&self.proxy_tickets)
            .collect()
    }
}

/// Three service tickets, one of which backs a proxy-granting ticket that
/// issued two proxy tickets.
async fn busy_session(env: &TestEnv) -> Session {
    let tgt = env.login().await;
    let service_tickets = vec![
        env.grant(&tgt, APP).await,
        env.grant(&tgt, "https://a.example.org").await,
        env.grant(&tgt, PORTAL).await,
    ];
    let pgt = env
        .authority
        .create_proxy_granting_ticket(&service_tickets[2])
        .await
        .unwrap();
    let mut proxy_tickets = Vec::new();
    for _ in 0..2 {
        proxy_tickets.push(
            env.authority
                .grant_proxy_ticket(&pgt, &Service::new(BACKEND))
                .await
                .unwrap(),
        );
    }
    Session {
        tgt,
        service_tickets,
        pgt,
        proxy_tickets,
    }
}

#[tokio::test]
async fn test_destroy_cascades_whole_tree() {
    let env = TestEnv::new();
    let session = busy_session(&env).await;

    let requests = env
        .authority
        .destroy_ticket_granting_ticket(&session.tgt)
        .await
        .unwrap();
    assert_eq!(requests.tickets_removed(), 7);
    assert_eq!(requests.len(), 6);

    let requests: Vec<_> = requests.collect();
    let pgt_request = requests
        .iter()
        .find(|r| r.ticket_id == session.pgt)
        .unwrap();
    assert_eq!(pgt_request.service, Service::new(PORTAL));
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.ticket_id.kind() == Some(TicketKind::Proxy))
            .count(),
        2
    );

    for id in session.all() {
        assert!(!env.exists(id).await, "{id} survived logout");
    }
    assert!(env.store.is_empty());
}

#[tokio::test]
async fn test_logout_notifies_every_service_once() {
    let env = TestEnv::new();
    let session = busy_session(&env).await;
    let requests = env
        .authority
        .destroy_ticket_granting_ticket(&session.tgt)
        .await
        .unwrap();

    let notifier = RecordingNotifier::default().unreachable(BACKEND);
    let summary = notify_single_logout(requests, &notifier).await;

    assert_eq!(summary, LogoutSummary { notified: 4, failed: 2 });
    assert_eq!(notifier.attempts(), 6);
}

#[tokio::test]
async fn test_validated_tickets_still_receive_logout() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    for service in [APP, "https://b.example.org"] {
        let st = env.grant(&tgt, service).await;
        env.authority
            .validate_service_ticket(&st, &Service::new(service), false)
            .await
            .unwrap();
    }

    let requests: Vec<_> = env
        .authority
        .destroy_ticket_granting_ticket(&tgt)
        .await
        .unwrap()
        .collect();
    let services: Vec<_> = requests.iter().map(|r| r.service.id()).collect();
    assert_eq!(services, vec![APP, "https://b.example.org"]);
}

#[tokio::test]
async fn test_destroy_is_idempotent() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    env.grant(&tgt, APP).await;

    let first = env.authority.destroy_ticket_granting_ticket(&tgt).await.unwrap();
    assert_eq!(first.len(), 1);

    let second = env.authority.destroy_ticket_granting_ticket(&tgt).await.unwrap();
    assert_eq!(second.len(), 0);
    assert_eq!(second.tickets_removed(), 0);
}

#[tokio::test]
async fn test_logout_leaves_other_sessions_alone() {
    let env = TestEnv::new();
    let mine = env.login().await;
    let theirs = env.login().await;
    let their_st = env.grant(&theirs, APP).await;

    env.authority.destroy_ticket_granting_ticket(&mine).await.unwrap();

    assert!(env.exists(&theirs).await);
    env.authority
        .validate_service_ticket(&their_st, &Service::new(APP), false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_destroy_rejects_non_session_ids() {
    let env = TestEnv::new();
    let tgt = env.login().await;
    let st = env.grant(&tgt, APP).await;

    assert!(env
        .authority
        .destroy_ticket_granting_ticket(&st)
        .await
        .unwrap_err()
        .is_invalid_ticket());
    assert!(env.exists(&st).await);
}
