//! Failover engine tests
//!
//! The `Provider` trait is mocked with mockall; time is paused so cooldown
//! waits and backoffs complete instantly while `Instant` still advances.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobpilot_config::ProviderDescriptor;
use jobpilot_provider::{
    ChatParams, ChatResponse, Completer, CooldownTable, FailoverClient, FailoverPolicy, Message,
    Provider, ProviderError, ProviderSlot, MAX_COOLDOWN,
};
use mockall::mock;
use tokio::time::Instant;

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

fn descriptor(id: &str, delay_secs: u64, cooldown_secs: u64) -> ProviderDescriptor {
    ProviderDescriptor::new(
        id,
        id.to_uppercase(),
        format!("{}_API_KEY", id.to_uppercase()),
        "http://localhost",
        format!("{}-model", id),
        delay_secs,
        cooldown_secs,
    )
}

fn mock_provider(configured: bool) -> MockProvider {
    let mut mock = MockProvider::new();
    mock.expect_is_configured().returning(move || configured);
    mock.expect_default_model()
        .returning(|| "mock-model".to_string());
    mock
}

fn slot(id: &str, mock: MockProvider) -> ProviderSlot {
    ProviderSlot::new(descriptor(id, 3, 30), Arc::new(mock))
}

fn conversation() -> Vec<Message> {
    vec![Message::system("preamble"), Message::user("Begin.")]
}

#[tokio::test(start_paused = true)]
async fn test_routes_around_cooling_provider_without_touching_its_cooldown() {
    let mut a = mock_provider(true);
    a.expect_chat().never();

    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("from b")));

    let mut c = mock_provider(false);
    c.expect_chat().never();

    let client = FailoverClient::new(
        vec![slot("a", a), slot("b", b), slot("c", c)],
        FailoverPolicy::default(),
    );
    let cooldowns = client.cooldowns();
    cooldowns.set("a", Duration::from_secs(60)).await;
    let a_until = cooldowns.available_at("a").await;

    let text = client.complete(&conversation(), 256).await.unwrap();

    assert_eq!(text, "from b");
    assert_eq!(cooldowns.available_at("a").await, a_until);
    assert!(cooldowns.available_at("b").await.is_none());
    assert!(cooldowns.available_at("c").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_single_failing_provider_exhausts_within_budget() {
    let mut a = mock_provider(true);
    a.expect_chat()
        .returning(|_| Err(ProviderError::Connection("refused".to_string())));

    let client = FailoverClient::new(vec![slot("a", a)], FailoverPolicy::default());

    let started = Instant::now();
    let result = client.complete(&conversation(), 256).await;
    let elapsed = started.elapsed();

    match result {
        Err(ProviderError::AllProvidersExhausted { waited }) => assert_eq!(waited, elapsed),
        other => panic!("Expected AllProvidersExhausted, got {:?}", other),
    }
    // 2s per round of attempts plus 32s of cooldown and margin; the ninth
    // cooldown would end past the 300s budget
    assert_eq!(elapsed.as_secs(), 274);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_longer_than_budget_gives_up_at_once() {
    let mut a = mock_provider(true);
    a.expect_chat().times(1).returning(|_| {
        Err(ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(3600)),
        })
    });

    let client = FailoverClient::new(vec![slot("a", a)], FailoverPolicy::default());

    let started = Instant::now();
    let result = client.complete(&conversation(), 256).await;

    assert!(matches!(
        result,
        Err(ProviderError::AllProvidersExhausted { .. })
    ));
    assert!(started.elapsed() <= Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_retry_after_is_capped() {
    let mut a = mock_provider(true);
    a.expect_chat().times(1).returning(|_| {
        Err(ProviderError::RateLimited {
            retry_after: Some(Duration::MAX),
        })
    });

    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("b")));

    let client = FailoverClient::new(vec![slot("a", a), slot("b", b)], FailoverPolicy::default());
    let cooldowns = client.cooldowns();

    assert_eq!(client.complete(&conversation(), 256).await.unwrap(), "b");
    assert_eq!(cooldowns.remaining("a", Instant::now()).await, MAX_COOLDOWN);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_ends_retries_and_uses_advertised_cooldown() {
    let mut a = mock_provider(true);
    a.expect_chat().times(1).returning(|_| {
        Err(ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(10)),
        })
    });

    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("ok")));

    let client = FailoverClient::new(vec![slot("a", a), slot("b", b)], FailoverPolicy::default());
    let cooldowns = client.cooldowns();

    let before = Instant::now();
    assert_eq!(client.complete(&conversation(), 256).await.unwrap(), "ok");

    // advertised 10s plus the one second buffer
    let until = cooldowns.available_at("a").await.unwrap();
    assert_eq!(until - before, Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_without_hint_uses_provider_default() {
    let mut a = mock_provider(true);
    a.expect_chat()
        .times(1)
        .returning(|_| Err(ProviderError::RateLimited { retry_after: None }));

    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("ok")));

    let client = FailoverClient::new(
        vec![
            ProviderSlot::new(descriptor("a", 3, 45), Arc::new(a)),
            slot("b", b),
        ],
        FailoverPolicy::default(),
    );
    let cooldowns = client.cooldowns();

    let before = Instant::now();
    client.complete(&conversation(), 256).await.unwrap();

    let until = cooldowns.available_at("a").await.unwrap();
    assert_eq!(until - before, Duration::from_secs(45));
}

#[tokio::test(start_paused = true)]
async fn test_empty_response_is_retried_on_same_provider() {
    let mut calls = 0;
    let mut a = mock_provider(true);
    a.expect_chat().times(2).returning(move |_| {
        calls += 1;
        if calls == 1 {
            Ok(ChatResponse::empty())
        } else {
            Ok(ChatResponse::text("  second try  "))
        }
    });

    let mut b = mock_provider(true);
    b.expect_chat().never();

    let client = FailoverClient::new(vec![slot("a", a), slot("b", b)], FailoverPolicy::default());

    assert_eq!(
        client.complete(&conversation(), 256).await.unwrap(),
        "second try"
    );
    assert!(client.cooldowns().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_api_error_applies_short_cooldown_and_fails_over() {
    let mut a = mock_provider(true);
    a.expect_chat()
        .times(2)
        .returning(|_| Err(ProviderError::Api("model overloaded".to_string())));

    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("b answered")));

    let client = FailoverClient::new(vec![slot("a", a), slot("b", b)], FailoverPolicy::default());
    let cooldowns = client.cooldowns();

    let before = Instant::now();
    assert_eq!(
        client.complete(&conversation(), 256).await.unwrap(),
        "b answered"
    );

    // one 2s retry pause, then the 15s API error cooldown
    let until = cooldowns.available_at("a").await.unwrap();
    assert_eq!((until - before).as_secs(), 17);
}

#[tokio::test(start_paused = true)]
async fn test_transport_errors_back_off_exponentially() {
    let mut a = mock_provider(true);
    a.expect_chat()
        .times(3)
        .returning(|_| Err(ProviderError::Connection("reset".to_string())));

    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("b")));

    let policy = FailoverPolicy {
        retries_before_failover: 3,
        ..FailoverPolicy::default()
    };
    let client = FailoverClient::new(vec![slot("a", a), slot("b", b)], policy);

    let started = Instant::now();
    client.complete(&conversation(), 256).await.unwrap();

    // 2s + 4s of backoff before failing over
    assert_eq!(started.elapsed().as_secs(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_soonest_cooldown_when_all_are_cooling() {
    let mut a = mock_provider(true);
    a.expect_chat().never();

    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("b after wait")));

    let client = FailoverClient::new(vec![slot("a", a), slot("b", b)], FailoverPolicy::default());
    let cooldowns = client.cooldowns();
    cooldowns.set("a", Duration::from_secs(50)).await;
    cooldowns.set("b", Duration::from_secs(20)).await;

    let started = Instant::now();
    let text = client.complete(&conversation(), 256).await.unwrap();

    assert_eq!(text, "b after wait");
    // remaining cooldown plus the safety margin
    assert_eq!(started.elapsed().as_secs(), 22);
}

#[tokio::test(start_paused = true)]
async fn test_just_failed_provider_is_reused_when_it_is_the_only_option() {
    let mut calls = 0;
    let mut a = mock_provider(true);
    a.expect_chat().times(2).returning(move |_| {
        calls += 1;
        if calls == 1 {
            Err(ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(4)),
            })
        } else {
            Ok(ChatResponse::text("recovered"))
        }
    });

    let client = FailoverClient::new(vec![slot("a", a)], FailoverPolicy::default());

    let started = Instant::now();
    assert_eq!(
        client.complete(&conversation(), 256).await.unwrap(),
        "recovered"
    );
    // 4s advertised + 1s buffer, then the 2s wait margin
    assert_eq!(started.elapsed().as_secs(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_just_failed_provider_is_deprioritised() {
    let mut a = mock_provider(true);
    a.expect_chat()
        .times(1)
        .returning(|_| Err(ProviderError::Api("bad request".to_string())));

    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("b")));

    // zero cooldown leaves a selectable, but b still goes next
    let policy = FailoverPolicy {
        retries_before_failover: 1,
        api_error_cooldown: Duration::ZERO,
        ..FailoverPolicy::default()
    };
    let client = FailoverClient::new(vec![slot("a", a), slot("b", b)], policy);
    assert_eq!(client.complete(&conversation(), 256).await.unwrap(), "b");
}

#[tokio::test]
async fn test_no_configured_providers() {
    let mut a = mock_provider(false);
    a.expect_chat().never();

    let client = FailoverClient::new(vec![slot("a", a)], FailoverPolicy::default());

    match client.complete(&conversation(), 256).await {
        Err(ProviderError::NoProvidersConfigured(keys)) => assert_eq!(keys, "A_API_KEY"),
        other => panic!("Expected NoProvidersConfigured, got {:?}", other),
    }
}

#[tokio::test]
async fn test_model_override_and_token_limit_reach_backend() {
    let mut a = mock_provider(true);
    a.expect_chat()
        .times(1)
        .withf(|params| {
            params.model == "forced-model" && params.max_tokens == 512 && params.messages.len() == 2
        })
        .returning(|_| Ok(ChatResponse::text("ok")));

    let client = FailoverClient::new(vec![slot("a", a)], FailoverPolicy::default())
        .with_model_override(Some("forced-model".to_string()));

    client.complete(&conversation(), 512).await.unwrap();
}

#[tokio::test]
async fn test_default_model_used_without_override() {
    let mut a = mock_provider(true);
    a.expect_chat()
        .times(1)
        .withf(|params| params.model == "mock-model")
        .returning(|_| Ok(ChatResponse::text("ok")));

    let client = FailoverClient::new(vec![slot("a", a)], FailoverPolicy::default());
    client.complete(&conversation(), 64).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shared_cooldown_table_is_honoured() {
    let shared = Arc::new(CooldownTable::new(["a", "b"]));
    shared.set("a", Duration::from_secs(120)).await;

    let mut a = mock_provider(true);
    a.expect_chat().never();
    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("b")));

    let client = FailoverClient::new(vec![slot("a", a), slot("b", b)], FailoverPolicy::default())
        .with_cooldowns(Arc::clone(&shared));

    assert_eq!(client.complete(&conversation(), 64).await.unwrap(), "b");
}

#[tokio::test(start_paused = true)]
async fn test_shared_table_learns_catalog_ids() {
    let shared = Arc::new(CooldownTable::new(["other"]));

    let mut a = mock_provider(true);
    a.expect_chat().times(1).returning(|_| {
        Err(ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(10)),
        })
    });
    let mut b = mock_provider(true);
    b.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("b")));

    let client = FailoverClient::new(vec![slot("a", a), slot("b", b)], FailoverPolicy::default())
        .with_cooldowns(Arc::clone(&shared));

    let before = Instant::now();
    assert_eq!(client.complete(&conversation(), 64).await.unwrap(), "b");
    let until = shared.available_at("a").await.unwrap();
    assert_eq!(until - before, Duration::from_secs(11));
    assert!(shared.knows("other"));
}

#[test]
fn test_call_delay_follows_first_configured_provider() {
    let a = mock_provider(false);
    let b = mock_provider(true);
    let client = FailoverClient::new(
        vec![
            ProviderSlot::new(descriptor("a", 3, 30), Arc::new(a)),
            ProviderSlot::new(descriptor("b", 7, 60), Arc::new(b)),
        ],
        FailoverPolicy::default(),
    );
    assert_eq!(client.call_delay(), Duration::from_secs(7));

    let none = FailoverClient::new(
        vec![ProviderSlot::new(descriptor("a", 3, 30), Arc::new(mock_provider(false)))],
        FailoverPolicy::default(),
    );
    assert_eq!(none.call_delay(), Duration::from_secs(5));
    assert!(none.status_report().contains("WARNING: No API keys configured!"));
}
