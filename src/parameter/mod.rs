//! Filter parameters: typed values owned by filters, readable by controllers.

mod store;
mod value;
mod view;

pub use store::{ParameterInfo, ParameterStore, Setter, SubscribeFlags};
pub use value::{ParameterType, ParameterValue};
pub use view::ParameterView;
