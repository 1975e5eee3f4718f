pub(crate) mod init;
pub(crate) mod request;
pub(crate) mod values;
