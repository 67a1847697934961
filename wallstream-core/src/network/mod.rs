mod connection;

pub use connection::{
    Connection, FlushPolicy, MessageSink, MessageSource, DEFAULT_PORT,
    DEFAULT_RECEIVE_TIMEOUT,
};
