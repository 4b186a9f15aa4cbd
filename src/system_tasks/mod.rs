pub mod daemon;
pub mod order_expiry;
pub mod telegram;
pub mod web_admin;
