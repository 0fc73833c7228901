use proptest::prelude::*;

/// Strategy for one topic segment (`stock`, `routine_creee`)
pub fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

/// Strategy for dot-separated topics of 1 to 4 segments
pub fn topic_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment_strategy(), 1..=4)
}

/// Strategy for subscription priorities
pub fn priority_strategy() -> impl Strategy<Value = i32> {
    -100i32..=100
}
