//! Domain model shared by the API and store layers.
mod order;
mod product;
mod user;

pub use order::{Order, OrderChange, OrderChangeOp, OrderStatus, OrderStatusUpdate, newest_first};
pub use product::Product;
pub use user::{Role, User, UserPatchRequest};
