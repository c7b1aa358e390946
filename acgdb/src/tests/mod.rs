mod mock;

mod migration;
mod ndjson;
mod store;
