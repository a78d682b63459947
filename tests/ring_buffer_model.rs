//! Random push/pop sequences against a VecDeque holding `capacity - 1` at most.

use std::collections::VecDeque;

use locks_n_rings::{FastRingBuffer, RingBuffer};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Push(u32),
    Pop,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![any::<u32>().prop_map(Op::Push), Just(Op::Pop)],
        0..256,
    )
}

proptest! {
    #[test]
    fn basic_matches_model(capacity in 1usize..16, ops in ops()) {
        let mut buffer = RingBuffer::new(capacity);
        let mut model = VecDeque::new();
        for op in ops {
            match op {
                Op::Push(v) => {
                    let pushed = buffer.push(v);
                    if model.len() < capacity - 1 {
                        prop_assert_eq!(pushed, Ok(()));
                        model.push_back(v);
                    } else {
                        prop_assert_eq!(pushed, Err(v));
                    }
                }
                Op::Pop => prop_assert_eq!(buffer.pop(), model.pop_front()),
            }
        }
    }

    #[test]
    fn fast_matches_model(capacity in 1usize..16, ops in ops()) {
        let mut buffer = FastRingBuffer::new(capacity);
        let mut model = VecDeque::new();
        for op in ops {
            match op {
                Op::Push(v) => {
                    let pushed = buffer.push(v);
                    if model.len() < capacity - 1 {
                        prop_assert_eq!(pushed, Ok(()));
                        model.push_back(v);
                    } else {
                        prop_assert_eq!(pushed, Err(v));
                    }
                }
                Op::Pop => prop_assert_eq!(buffer.pop(), model.pop_front()),
            }
        }
    }
}
