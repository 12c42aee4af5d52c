mod store;

pub use store::CounterStore;
