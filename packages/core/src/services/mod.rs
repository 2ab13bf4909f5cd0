pub mod nightscout;

#[cfg(test)]
pub(crate) mod mock_nightscout;
