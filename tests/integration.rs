//! Integration tests for the subscription graph.

use facet::{Params, Selector, Stage, Store, StoreConfig};
use serde_json::json;

fn user_fixture() -> serde_json::Value {
    json!({
        "users": [
            {"id": 1, "name": "alice", "active": true,  "admin": true},
            {"id": 2, "name": "bob",   "active": true,  "admin": false},
            {"id": 3, "name": "carol", "active": false, "admin": true},
            {"id": 4, "name": "dave",  "active": true,  "admin": true}
        ]
    })
}

/// Store with the four-level chain:
/// users -> active_users -> admin_users -> admin_user(id).
fn chain_store() -> Store {
    let store = Store::new(StoreConfig {
        name: "app".to_string(),
        initial_state: user_fixture(),
    });

    store
        .register_selector(Selector::reader("users", |state, _| state["users"].clone()))
        .unwrap();

    store
        .register_selector(Selector::pipeline(
            "active_users",
            vec![
                Stage::selector_ref("users"),
                Stage::combine(|args, _| {
                    let users = args[0].as_array().cloned().unwrap_or_default();
                    json!(users
                        .into_iter()
                        .filter(|u| u["active"] == json!(true))
                        .collect::<Vec<_>>())
                }),
            ],
        ))
        .unwrap();

    store
        .register_selector(Selector::pipeline(
            "admin_users",
            vec![
                Stage::selector_ref("active_users"),
                Stage::combine(|args, _| {
                    let users = args[0].as_array().cloned().unwrap_or_default();
                    json!(users
                        .into_iter()
                        .filter(|u| u["admin"] == json!(true))
                        .collect::<Vec<_>>())
                }),
            ],
        ))
        .unwrap();

    store
        .register_selector(Selector::pipeline(
            "admin_user",
            vec![
                Stage::selector_ref("admin_users"),
                Stage::combine(|args, params| {
                    let id = params.get(0).cloned().unwrap_or(json!(null));
                    args[0]
                        .as_array()
                        .and_then(|users| users.iter().find(|u| u["id"] == id))
                        .cloned()
                        .unwrap_or(json!(null))
                }),
            ],
        ))
        .unwrap();

    store
}

// --- Worked Examples ---

#[test]
fn test_single_selector_subscribe_then_unsubscribe() {
    let store = Store::new(StoreConfig {
        name: "app".to_string(),
        initial_state: json!({"value": 0}),
    });
    store
        .register_selector(Selector::reader("value", |state, _| state["value"].clone()))
        .unwrap();

    let mut handle = store.subscribe("value", Params::none()).unwrap();
    assert_eq!(store.subscription_count(), 1);
    assert_eq!(store.trigger_count(), 1);
    assert_eq!(handle.last_value().map(|v| (**v).clone()), Some(json!(0)));

    handle.unsubscribe();
    assert_eq!(store.subscription_count(), 0);
    assert_eq!(store.trigger_count(), 0);
}

#[test]
fn test_chain_yields_one_subscription_per_level() {
    let store = chain_store();

    let mut handle = store
        .subscribe("admin_user", Params::new(vec![json!(1)]))
        .unwrap();

    // 3-level composition over the root reader: 4 live nodes, 1 trigger.
    assert_eq!(store.subscription_count(), 4);
    assert_eq!(store.trigger_count(), 1);

    let value = store.select(&mut handle).unwrap();
    assert_eq!(value["name"], json!("alice"));

    handle.unsubscribe();
    assert_eq!(store.subscription_count(), 0);
    assert_eq!(store.trigger_count(), 0);
}

#[test]
fn test_reverse_level_order_drains_stepwise() {
    let store = chain_store();

    let mut handles = vec![
        store.subscribe("users", Params::none()).unwrap(),
        store.subscribe("active_users", Params::none()).unwrap(),
        store.subscribe("admin_users", Params::none()).unwrap(),
        store
            .subscribe("admin_user", Params::new(vec![json!(1)]))
            .unwrap(),
    ];
    assert_eq!(store.subscription_count(), 4);
    assert_eq!(store.trigger_count(), 4);

    // Deepest level first: sizes drain 4 -> 3 -> 2 -> 1 -> 0 in lockstep.
    for expected in (0..4).rev() {
        handles[expected].unsubscribe();
        assert_eq!(store.subscription_count(), expected);
        assert_eq!(store.trigger_count(), expected);
    }
}

fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn go(prefix: &mut Vec<usize>, remaining: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if remaining.is_empty() {
            out.push(prefix.clone());
            return;
        }
        for i in 0..remaining.len() {
            let x = remaining.remove(i);
            prefix.push(x);
            go(prefix, remaining, out);
            prefix.pop();
            remaining.insert(i, x);
        }
    }

    let mut out = Vec::new();
    go(&mut Vec::new(), &mut (0..n).collect(), &mut out);
    out
}

#[test]
fn test_every_detach_order_ends_empty() {
    for order in permutations(4) {
        let store = chain_store();
        let mut handles = vec![
            store.subscribe("users", Params::none()).unwrap(),
            store.subscribe("active_users", Params::none()).unwrap(),
            store.subscribe("admin_users", Params::none()).unwrap(),
            store
                .subscribe("admin_user", Params::new(vec![json!(1)]))
                .unwrap(),
        ];

        for (step, &i) in order.iter().enumerate() {
            handles[i].unsubscribe();
            // The trigger registry always tracks remaining live handles.
            assert_eq!(
                store.trigger_count(),
                3 - step,
                "trigger count diverged for order {:?}",
                order
            );
        }

        assert_eq!(
            store.subscription_count(),
            0,
            "subscription table not drained for order {:?}",
            order
        );
        assert_eq!(store.trigger_count(), 0);
    }
}

// --- Mutation and Recomputation ---

#[test]
fn test_mutation_flows_through_chain() {
    let store = chain_store();
    let mut handle = store.subscribe("admin_users", Params::none()).unwrap();

    let before = store.select(&mut handle).unwrap();
    assert_eq!(before.as_array().unwrap().len(), 2); // alice, dave

    // Promote bob.
    store.mutate(|state| state["users"][1]["admin"] = json!(true));

    let after = store.select(&mut handle).unwrap();
    assert_eq!(after.as_array().unwrap().len(), 3);
    assert!(handle.pending_render());

    handle.unsubscribe();
}

#[test]
fn test_parameterized_selectors_get_distinct_nodes() {
    let store = chain_store();

    let mut h1 = store
        .subscribe("admin_user", Params::new(vec![json!(1)]))
        .unwrap();
    let mut h4 = store
        .subscribe("admin_user", Params::new(vec![json!(4)]))
        .unwrap();

    // Distinct roots, shared upstream levels: 2 roots + 3 shared = 5.
    assert_ne!(h1.subscription_key(), h4.subscription_key());
    assert_eq!(store.subscription_count(), 5);

    assert_eq!(store.select(&mut h1).unwrap()["name"], json!("alice"));
    assert_eq!(store.select(&mut h4).unwrap()["name"], json!("dave"));

    h1.unsubscribe();
    // The shared upstream levels survive for the remaining consumer.
    assert_eq!(store.subscription_count(), 4);
    h4.unsubscribe();
    assert_eq!(store.subscription_count(), 0);
}

#[test]
fn test_subscription_enumeration_is_insertion_ordered() {
    let store = chain_store();

    let h_users = store.subscribe("users", Params::none()).unwrap();
    let h_active = store.subscribe("active_users", Params::none()).unwrap();

    let keys = store.subscription_keys();
    assert_eq!(keys.len(), 2);
    assert_eq!(&keys[0], h_users.subscription_key());
    assert_eq!(&keys[1], h_active.subscription_key());

    let targets = store.trigger_targets();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].handle_id, h_users.id());
    assert_eq!(targets[1].handle_id, h_active.id());

    let infos = store.subscriptions();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].selector_id.as_str(), "users");
    assert_eq!(infos[0].trigger_count, 1);
    assert_eq!(infos[0].holder_count, 1); // held by the composed consumer
    assert_eq!(infos[1].selector_id.as_str(), "active_users");
    assert_eq!(infos[1].trigger_count, 1);
}

#[test]
fn test_projected_params_reach_upstream() {
    let store = Store::new(StoreConfig {
        name: "app".to_string(),
        initial_state: json!({"items": ["a", "b", "c"]}),
    });

    store
        .register_selector(
            Selector::reader("item", |state, params| {
                let index = params.get(0).and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                state["items"][index].clone()
            })
            .with_signature("item_index"),
        )
        .unwrap();
    store
        .register_selector(
            Selector::pipeline(
                "item_label",
                vec![
                    Stage::selector_ref("item"),
                    Stage::combine(|args, params| {
                        let index = params.get(0).and_then(|v| v.as_u64()).unwrap_or(0);
                        json!(format!("{}:{}", index, args[0].as_str().unwrap_or("")))
                    }),
                ],
            )
            .with_projector("item_index", |params| params.clone()),
        )
        .unwrap();

    let mut h1 = store
        .subscribe("item_label", Params::new(vec![json!(1)]))
        .unwrap();
    assert_eq!(*store.select(&mut h1).unwrap(), json!("1:b"));
    assert_eq!(store.subscription_count(), 2);

    // Distinct downstream params project to distinct upstream nodes.
    let mut h2 = store
        .subscribe("item_label", Params::new(vec![json!(2)]))
        .unwrap();
    assert_eq!(*store.select(&mut h2).unwrap(), json!("2:c"));
    assert_eq!(store.subscription_count(), 4);

    h1.unsubscribe();
    h2.unsubscribe();
    assert_eq!(store.subscription_count(), 0);
}
