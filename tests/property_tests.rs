//! Property-based tests for the transition guard, history and registry.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated machines and transition sequences.

use proptest::prelude::*;
use serde_json::Value;
use statehook::{HistoryBuffer, MachineError, StateBuilder, StateMachine};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn name(index: usize) -> String {
    format!("S{index}")
}

prop_compose! {
    /// Adjacency lists for 2 to 5 states; `graph[i][j]` allows `Si -> Sj`.
    fn arbitrary_graph()(size in 2..6usize)
        (graph in prop::collection::vec(prop::collection::vec(any::<bool>(), size), size))
        -> Vec<Vec<bool>> {
        graph
    }
}

prop_compose! {
    fn graph_and_walk()(graph in arbitrary_graph())
        (walk in prop::collection::vec(0..graph.len(), 1..20), graph in Just(graph))
        -> (Vec<Vec<bool>>, Vec<usize>) {
        (graph, walk)
    }
}

fn build(graph: &[Vec<bool>], history: usize) -> StateMachine {
    let states = graph.iter().enumerate().map(|(i, edges)| {
        let next: Vec<String> = edges
            .iter()
            .enumerate()
            .filter(|(_, allowed)| **allowed)
            .map(|(j, _)| name(j))
            .collect();
        StateBuilder::new(name(i), i as i64).next(next)
    });
    StateMachine::builder()
        .autostart(false)
        .history(history)
        .states(states)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn transitions_follow_declared_successors((graph, walk) in graph_and_walk()) {
        let machine = build(&graph, 64);
        let rt = runtime();
        rt.block_on(machine.start()).unwrap();

        let mut current = 0usize;
        let mut path = vec![name(0)];
        for target in walk {
            let result = rt.block_on(machine.transition(name(target).as_str(), Value::Null));
            if target == current {
                prop_assert!(result.is_ok());
            } else if graph[current][target] {
                prop_assert!(result.is_ok());
                current = target;
                path.push(name(target));
            } else {
                let rejected = matches!(result, Err(MachineError::TransitionRejected { .. }));
                prop_assert!(rejected);
            }
            let current_state = machine.current();
            let expected = name(current);
            prop_assert_eq!(current_state.name(), expected.as_str());
            prop_assert!(!machine.is_transitioning());
        }

        let history = machine.history();
        prop_assert_eq!(history.path(), path.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn guard_queries_agree_with_declarations(graph in arbitrary_graph()) {
        let machine = build(&graph, 0);
        for (i, edges) in graph.iter().enumerate() {
            for (j, allowed) in edges.iter().enumerate() {
                prop_assert_eq!(machine.can_transition(name(i), name(j)).unwrap(), *allowed);
            }
            prop_assert!(machine.can_transition(name(i), "ERROR").unwrap());
        }
    }

    #[test]
    fn only_the_initial_state_is_reachable_from_null(graph in arbitrary_graph()) {
        let machine = build(&graph, 0);
        for i in 0..graph.len() {
            prop_assert_eq!(machine.can_transition_to(name(i)), i == 0);
        }
    }

    #[test]
    fn history_keeps_most_recent_entries(
        capacity in 0..8usize,
        states in prop::collection::vec("[A-Z][a-z]{0,6}", 0..30),
    ) {
        let mut history = HistoryBuffer::new(capacity);
        for state in &states {
            history.record(state.as_str());
        }

        let kept = states.len().min(capacity);
        prop_assert_eq!(history.len(), kept);
        let expected: Vec<&str> = states[states.len() - kept..].iter().map(String::as_str).collect();
        prop_assert_eq!(history.path(), expected);
    }

    #[test]
    fn first_or_marked_state_is_initial(size in 1..6usize, marked in prop::option::of(0..6usize)) {
        let marked = marked.filter(|m| *m < size);
        let states = (0..size).map(|i| {
            let state = StateBuilder::new(name(i), i as i64);
            if Some(i) == marked { state.initial() } else { state }
        });
        let machine = StateMachine::builder()
            .autostart(false)
            .states(states)
            .build()
            .unwrap();

        let initial_state = machine.initial();
        let expected = name(marked.unwrap_or(0));
        prop_assert_eq!(initial_state.name(), expected.as_str());
        let names = machine.states();
        prop_assert_eq!(names.len(), size + 1);
        prop_assert_eq!(names.last().map(String::as_str), Some("ERROR"));
    }
}
