pub mod core {
    pub mod config;
    pub mod error;
    pub mod routes;
    pub mod startup;
    pub mod state;
    pub mod tracing_init;
}

pub mod features {
    pub mod bus;
    pub mod grid_info;
    pub mod inventory;
    pub mod login_flags;
    pub mod max_groups;
    pub mod ui_config;
}

pub mod handlers {
    pub mod fallback;
    pub mod grid_info;
    pub mod health;
    pub mod login;
    pub mod metrics;
}

pub mod metrics {
    pub mod collector;
}

pub mod models {
    pub mod account;
    pub mod grid_info;
    pub mod inventory;
    pub mod login;
    pub mod presence;
}

pub mod network {
    pub mod circuit;
}

pub mod rpc {
    pub mod encoder;
    pub mod parser;
    pub mod response;
    pub mod value;
}

pub mod stores {
    pub mod account_store;
    pub mod inventory_store;
    pub mod presence_registry;
}

pub mod utils {
    pub mod auth;
    pub mod time;
}

pub mod validation {
    pub mod login;
}

pub mod wal {
    pub mod wal;
}
