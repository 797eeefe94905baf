mod support;

use geist::chat::ChatAssistant;
use geist::config::Config;
use geist::conversation::TurnStore;
use std::sync::Arc;
use support::{ScriptedBackend, fast_gateway, test_profile};

fn assistant_with_tuning(tune: impl FnOnce(&mut Config)) -> ChatAssistant {
    let mut config = Config::default();
    tune(&mut config);
    let gateway = fast_gateway(Box::new(ScriptedBackend::always("ok")));
    let turns = Arc::new(TurnStore::open_in_memory().unwrap());
    ChatAssistant::new(&config, gateway, turns, test_profile())
}

const ON_TOPIC: &str = "rust compiler question";
const OFF_TOPIC: &str = "favorite sandwich toppings instead";

#[tokio::test]
async fn three_off_topic_messages_cost_one_decay() {
    // Defaults: cutoff 40, threshold 3, decay 0.3.
    let assistant = assistant_with_tuning(|_| {});
    for _ in 0..3 {
        assistant.chat("s", OFF_TOPIC, false).await.unwrap();
    }

    let state = assistant.session_state("s").await.unwrap();
    assert!((state.patience - 0.7).abs() < 1e-9);
    assert_eq!(state.snark, 0.0);
    // The counter resets after the decay fires.
    assert_eq!(state.consecutive_off_topic, 0);
}

#[tokio::test]
async fn on_topic_recovery_is_gradual_and_capped() {
    let assistant = assistant_with_tuning(|c| c.tone.recovery = 0.1);
    for _ in 0..3 {
        assistant.chat("s", OFF_TOPIC, false).await.unwrap();
    }
    for _ in 0..2 {
        assistant.chat("s", ON_TOPIC, false).await.unwrap();
    }
    let state = assistant.session_state("s").await.unwrap();
    assert!((state.patience - 0.9).abs() < 1e-9);

    // Recovery never overshoots 1.0.
    for _ in 0..5 {
        assistant.chat("s", ON_TOPIC, false).await.unwrap();
    }
    let state = assistant.session_state("s").await.unwrap();
    assert_eq!(state.patience, 1.0);
}

#[tokio::test]
async fn depleted_patience_escalates_snark() {
    let assistant = assistant_with_tuning(|c| {
        c.tone.decay_rate = 0.5;
        c.tone.repeat_threshold = 2;
        c.tone.snark_increment = 0.25;
    });

    // Two decays drain patience to zero; the second lands at 0.0, which is
    // already the trigger for snark.
    for _ in 0..4 {
        assistant.chat("s", OFF_TOPIC, false).await.unwrap();
    }
    let state = assistant.session_state("s").await.unwrap();
    assert_eq!(state.patience, 0.0);
    assert!((state.snark - 0.25).abs() < 1e-9);

    // Further drift keeps escalating, capped at 1.0.
    for _ in 0..8 {
        assistant.chat("s", OFF_TOPIC, false).await.unwrap();
    }
    let state = assistant.session_state("s").await.unwrap();
    assert_eq!(state.snark, 1.0);
    assert!(!state.corrective);
}

#[tokio::test]
async fn strict_session_goes_corrective_instead_of_snarky() {
    let assistant = assistant_with_tuning(|c| {
        c.tone.decay_rate = 0.5;
        c.tone.repeat_threshold = 2;
    });

    for _ in 0..6 {
        assistant.chat("s", OFF_TOPIC, true).await.unwrap();
    }
    let state = assistant.session_state("s").await.unwrap();
    assert_eq!(state.patience, 0.0);
    assert_eq!(state.snark, 0.0);
    assert!(state.corrective);
}

#[tokio::test]
async fn state_series_matches_the_recorded_turns() {
    let assistant = assistant_with_tuning(|_| {});
    for _ in 0..3 {
        assistant.chat("s", OFF_TOPIC, false).await.unwrap();
    }
    assistant.chat("s", ON_TOPIC, false).await.unwrap();

    let series = assistant.state_series("s").unwrap();
    assert_eq!(series.patience.len(), 4);
    assert_eq!(series.snark.len(), 4);
    // First two off-topic turns leave patience untouched; the third decays it;
    // the on-topic turn earns some back.
    assert_eq!(series.patience[0], 1.0);
    assert_eq!(series.patience[1], 1.0);
    assert!((series.patience[2] - 0.7).abs() < 1e-9);
    assert!(series.patience[3] > series.patience[2]);
}

#[tokio::test]
async fn anchor_topics_from_config_count_as_on_topic() {
    let assistant = assistant_with_tuning(|c| {
        c.chat.anchor_topics = vec!["sandwich".into()];
    });
    for _ in 0..4 {
        assistant
            .chat("s", "sandwich ideas", false)
            .await
            .unwrap();
    }
    let state = assistant.session_state("s").await.unwrap();
    assert_eq!(state.patience, 1.0);
}
