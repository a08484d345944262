pub mod books;

use libris_kernel::ModuleRegistry;

use books::store::SharedStore;

/// Register every feature module with the registry
pub fn register_all(registry: &mut ModuleRegistry, store: SharedStore) -> anyhow::Result<()> {
    registry.register(books::create_module(store))?;
    Ok(())
}
