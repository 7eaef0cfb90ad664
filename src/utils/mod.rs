pub mod time;

/// Collision-resistant id for executions, log entries and stored items.
pub fn longid() -> String {
    nanoid::nanoid!(21)
}
