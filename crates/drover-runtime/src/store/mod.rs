mod memory;
mod postgres;

#[cfg(test)]
pub(crate) mod faulty;

pub use memory::MemoryStore;
pub use postgres::PgStore;
