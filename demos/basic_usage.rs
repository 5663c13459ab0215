// Basic usage example for sealed-settings
//
// Run with: cargo run --example basic_usage

use sealed_settings::{DefaultValue, SettingPolicy, SettingsConfig, SettingsManager};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Initialize settings manager at startup
    let config = SettingsConfig::builder("basic-usage")
        .organization("sealed-example")
        .config_dir("./example_config")
        .passphrase("example passphrase")
        .build();
    let manager = SettingsManager::initialize(config)?;

    println!("📦 sealed-settings Basic Usage Example\n");

    let theme = manager.create_or_get_setting(
        "ui.theme",
        DefaultValue::fixed("light"),
        SettingPolicy::new(),
    )?;
    let onboarding = manager.create_or_get_setting(
        "core.completed_onboarding",
        DefaultValue::fixed(false),
        SettingPolicy::new().keep_on_reset(),
    )?;
    let token = manager.create_or_get_setting(
        "account.token",
        DefaultValue::fixed(""),
        SettingPolicy::new().sensitive(),
    )?;

    theme.subscribe(|setting| println!("🔔 {} changed to {}", setting.key(), setting.get()));

    println!("🔧 Changing theme to 'dark'...");
    theme.set("dark")?;
    onboarding.set(true)?;
    token.set("abc123")?;

    let devices = manager.create_setting_group(
        "devices",
        SettingPolicy::new(),
        ["primary", "secondary"],
    )?;
    devices.set("primary", "laptop")?;
    if let Err(e) = devices.set("rogue", "phone") {
        println!("🚫 {e}");
    }

    // The singleton registered itself for log collection on startup
    sealed_settings::serialize_all_logs(&mut |name, text| println!("\n[{name}]\n{text}"));

    println!("🔄 Soft reset...");
    manager.reset()?;
    println!("✅ Theme: {}, onboarding kept: {}", theme.get(), onboarding.get());

    println!("💾 Settings file location: {:?}", manager.settings_file_name());

    drop(manager);
    SettingsManager::shutdown();
    Ok(())
}
