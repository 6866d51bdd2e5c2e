use anyhow::Context as _;

use crate::manifest::Manifest;

/// Print the effective service catalog (manifest override or built-in) as
/// YAML.
pub fn print_services(manifest: &Manifest) -> anyhow::Result<()> {
    let catalog = manifest.catalogs.effective_services();
    let yaml = serde_yml::to_string(&catalog).context("failed to render service catalog")?;
    print!("{yaml}");
    Ok(())
}

/// Print the effective token-pack catalog as YAML.
pub fn print_packs(manifest: &Manifest) -> anyhow::Result<()> {
    let catalog = manifest.catalogs.effective_packs();
    let yaml = serde_yml::to_string(&catalog).context("failed to render token-pack catalog")?;
    print!("{yaml}");
    Ok(())
}
