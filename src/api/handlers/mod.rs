pub mod admin;
pub mod balances;
pub mod books;
pub mod orders;
pub mod trades;
