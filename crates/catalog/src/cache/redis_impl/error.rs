use catalog_core::cache::CacheError;

/// Classifies a Redis failure: transport problems are connection failures,
/// everything else failed on the server.
pub fn cache_error(err: redis::RedisError) -> CacheError {
    let transport = err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
        || err.is_io_error();
    if transport {
        CacheError::ConnectionFailed(err.to_string())
    } else if err.kind() == redis::ErrorKind::TypeError {
        CacheError::Serialization(err.to_string())
    } else {
        CacheError::OperationFailed(err.to_string())
    }
}
