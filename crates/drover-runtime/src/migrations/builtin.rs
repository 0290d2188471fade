use super::runner::Migration;

const DROVER_INTERNAL_SQL: &str = include_str!("../../migrations/0000_drover_internal.sql");

/// Built-in migrations, in application order.
pub fn builtin_migrations() -> Vec<Migration> {
    vec![Migration::new("0000_drover_internal", DROVER_INTERNAL_SQL)]
}
