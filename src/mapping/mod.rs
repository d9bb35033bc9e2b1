//! Type and naming mapping per target profile. Everything here is a pure
//! function of its inputs.

mod naming;
mod profile;
mod types;

pub use naming::{map_name, pluralize, singularize};
pub(crate) use naming::on_last_word;
pub use profile::{Casing, DecimalRepr, Nullability, Role, TargetKey, TargetProfile};
pub use types::{TargetType, map_type};
