pub mod config;
pub mod error;
pub mod routes;
pub mod session_cookie;
pub mod state;

pub mod crypto {
    pub mod cipher;
}

pub mod models {
    pub mod identifier;
    pub mod principal;
    pub mod session;
}

pub mod repositories {
    pub mod directory;
    pub mod memory_directory;
    pub mod rest_directory;
}

pub mod services {
    pub mod container;
    pub mod login_sessions;
    pub mod realm;
}

pub mod handlers {
    pub mod api;
    pub mod auth;
    pub mod portal;
}

pub mod middleware_layer {
    pub mod authorization;
    pub mod auto_login;
    pub mod oauth;
}

pub mod validation {
    pub mod auth;
}
