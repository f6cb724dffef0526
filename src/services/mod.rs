pub mod auth;
pub mod cache;
pub mod timing;

#[cfg(test)]
pub(crate) mod test_log;
