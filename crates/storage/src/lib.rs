#![forbid(unsafe_code)]

mod store;

pub use store::{
    CreateChildRequest, CreateStoryRequest, ErrorCategory, SqliteStore, StoreError,
    UpdateNodeRequest, WindowRequest, WindowView,
};
