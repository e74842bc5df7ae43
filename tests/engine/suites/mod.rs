mod properties;
mod reload;
mod scenarios;
mod shared_cache;
