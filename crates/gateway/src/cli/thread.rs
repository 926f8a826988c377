use fr_domain::config::Config;

use crate::store::ThreadRegistry;

/// Assign `thread_id` to `user_id` in the registry under the state path.
pub async fn register(config: &Config, thread_id: &str, user_id: &str) -> anyhow::Result<()> {
    let registry = ThreadRegistry::new(&config.store.state_path)?;
    match registry.register(thread_id, user_id).await? {
        Some(previous) if previous != user_id => {
            println!("thread {thread_id} reassigned from {previous} to {user_id}");
        }
        Some(_) => println!("thread {thread_id} already registered to {user_id}"),
        None => println!("thread {thread_id} registered to {user_id}"),
    }
    Ok(())
}
