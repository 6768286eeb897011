use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use view_bind::adapter::builtin::{
    BoolTextOptions, DateTimeFormatOptions, BOOL_TO_STRING, DATETIME_TO_STRING,
};
use view_bind::prelude::*;
use view_bind::testing::{BindingHarness, TestView};

#[derive(Bindable, Default)]
#[bindable(name = "Quest")]
struct Quest {
    #[bindable(notifier)]
    notifier: PropertyNotifier,
    #[bindable(binding)]
    done: bool,
    #[bindable(binding)]
    deadline: NaiveDateTime,
    #[bindable(binding)]
    rewards: ObservableList,
}

#[derive(Bindable, Default)]
#[bindable(name = "Reward")]
struct Reward {
    #[bindable(binding)]
    title: String,
}

fn harness(config: BindingConfig) -> BindingHarness {
    let runtime = BindingRuntime::builder()
        .config(config)
        .register::<Quest>()
        .register::<Reward>()
        .build();
    BindingHarness::with_runtime(runtime)
}

fn deadline() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 14)
        .and_then(|d| d.and_hms_opt(18, 30, 0))
        .unwrap()
}

#[test]
fn test_adapter_options_from_json() {
    let harness = harness(BindingConfig::default());
    let quest = harness.attach(
        harness.root(),
        Quest {
            deadline: deadline(),
            ..Quest::default()
        },
    );
    let status = harness.spawn("status", harness.root());
    let status_view = harness.attach(status, TestView::new());
    harness.bind(
        status,
        OneWayPropertyBinding::new("Quest.done", "TestView.text").adapter(
            BOOL_TO_STRING,
            Some(AdapterOptions::new(
                BoolTextOptions::KIND,
                json!({ "true_text": "Complete", "false_text": "Open" }),
            )),
        ),
    );
    let due = harness.spawn("due", harness.root());
    let due_view = harness.attach(due, TestView::new());
    harness.bind(
        due,
        OneWayPropertyBinding::new("Quest.deadline", "TestView.text").adapter(
            DATETIME_TO_STRING,
            Some(AdapterOptions::new(
                DateTimeFormatOptions::KIND,
                json!({ "format": "%d/%m/%Y %H:%M" }),
            )),
        ),
    );

    harness.connect().unwrap();
    assert_eq!(TestView::text(&status_view), "Open");
    assert_eq!(TestView::text(&due_view), "14/03/2026 18:30");

    quest.update(|q: &mut Quest| {
        q.done = true;
        q.notifier.raise("done");
    });
    assert_eq!(TestView::text(&status_view), "Complete");
}

#[test]
fn test_options_adapters_fall_back_to_defaults() {
    let harness = harness(BindingConfig::default());
    harness.attach(
        harness.root(),
        Quest {
            deadline: deadline(),
            ..Quest::default()
        },
    );
    let status = harness.spawn("status", harness.root());
    let status_view = harness.attach(status, TestView::new());
    harness.bind(
        status,
        OneWayPropertyBinding::new("Quest.done", "TestView.text").adapter(BOOL_TO_STRING, None),
    );
    let due = harness.spawn("due", harness.root());
    let due_view = harness.attach(due, TestView::new());
    harness.bind(
        due,
        OneWayPropertyBinding::new("Quest.deadline", "TestView.text").adapter(DATETIME_TO_STRING, None),
    );

    harness.connect().unwrap();
    assert_eq!(TestView::text(&status_view), "False");
    assert_eq!(TestView::text(&due_view), "2026-03-14 18:30:00");
}

#[test]
fn test_config_round_trip() {
    let config = BindingConfig::from_json_str(
        r#"{ "resolver": { "host_namespaces": ["Host."] }, "sync": { "log_suppressed_errors": false } }"#,
    )
    .unwrap();
    assert_eq!(config.resolver.host_namespaces, vec!["Host.".to_string()]);
    assert!(!config.sync.log_suppressed_errors);
    assert!(config.pool.enabled);

    let text = config.to_json_string().unwrap();
    assert_eq!(BindingConfig::from_json_str(&text).unwrap(), config);
    assert!(matches!(
        BindingConfig::from_json_str(r#"{ "pool": { "initial_size": "many" } }"#),
        Err(BindError::InvalidConfig(_))
    ));
}

#[test]
fn test_host_namespace_is_stripped_from_references() {
    let mut config = BindingConfig::default();
    config.resolver.host_namespaces = vec!["Host.".to_string()];
    let harness = harness(config);
    harness.attach(harness.root(), Quest::default());
    let status = harness.spawn("status", harness.root());
    let view = harness.attach(status, TestView::new());
    harness.bind(
        status,
        OneWayPropertyBinding::new("Quest.done", "Host.Widgets.TestView.text"),
    );

    harness.connect().unwrap();
    assert_eq!(TestView::text(&view), "false");
}

#[test]
fn test_pool_prewarm_from_config() {
    let mut config = BindingConfig::default();
    config.pool.initial_size = 2;
    let harness = harness(config);
    let quest = harness.attach(harness.root(), Quest::default());
    let rewards = harness.spawn("rewards", harness.root());
    harness.bind(
        rewards,
        CollectionBinding::new(
            "Quest.rewards",
            vec![Template::new::<Reward>("reward_row", |scene, node| {
                scene.add_component(node, ObjectRef::new(TestView::new()))?;
                scene.add_binding(node, OneWayPropertyBinding::new("Reward.title", "TestView.text"))
            })],
        ),
    );

    let before = harness.read(|scene| scene.len());
    harness.connect().unwrap();
    assert_eq!(harness.read(|scene| scene.len()), before + 2);
    assert!(harness.children(rewards).is_empty());

    let list = quest.with(|q: &Quest| q.rewards.clone()).unwrap();
    list.push(Value::Object(ObjectRef::new(Reward {
        title: "Gold".into(),
    })));
    assert_eq!(harness.read(|scene| scene.len()), before + 2);
    let row = harness.children(rewards)[0];
    let view = harness.component::<TestView>(row).unwrap();
    assert_eq!(TestView::text(&view), "Gold");
}
