pub mod authority;
pub mod info;

pub use authority::handle_set_user_authority;
pub use info::handle_get_user_info;
