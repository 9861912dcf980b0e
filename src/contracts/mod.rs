pub mod did_registry;
