#![doc = include_str!("../README.md")]

mod auth;
mod command;
mod error;
pub mod format;
mod ids;
mod model;
mod repository;
pub mod store;

pub use crate::auth::*;
pub use crate::command::*;
pub use crate::error::*;
pub use crate::format::{ActionContext, ActionRequest, ActionResponse, ResponseType, SlashResponse};
pub use crate::ids::*;
pub use crate::model::*;
pub use crate::repository::*;
