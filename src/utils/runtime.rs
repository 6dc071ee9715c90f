use anyhow::Result;

/// Every tracker handler runs on this one thread and only interleaves with others at await
/// points.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
