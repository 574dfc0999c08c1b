use campus_modules::{IssueSeverity, LicensingError, ModuleManager, SeatLimits};
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum ModuleCommands {
    /// List modules with toggle and license state
    List,
    /// Enable a module
    Enable {
        /// Module key (e.g. "library")
        key: String,
    },
    /// Disable a module
    Disable {
        /// Module key (e.g. "library")
        key: String,
    },
    /// Drop the memoized module snapshot and re-read persisted state
    RefreshCache,
    /// Report catalog consistency issues
    Validate,
}

#[derive(Debug, Subcommand)]
pub enum LicenseCommands {
    /// Show the current license details
    Status,
    /// Submit a license key to the authority and store it on accept
    Validate {
        /// License key
        key: String,
    },
    /// Clear the license cache, forcing the next read to revalidate
    ClearCache,
}

pub async fn handle_module_command(
    cmd: ModuleCommands,
    manager: &mut ModuleManager,
) -> eyre::Result<()> {
    match cmd {
        ModuleCommands::List => {
            handle_module_list(manager).await?;
        }
        ModuleCommands::Enable { key } => {
            handle_toggle(manager, &key, true).await?;
        }
        ModuleCommands::Disable { key } => {
            handle_toggle(manager, &key, false).await?;
        }
        ModuleCommands::RefreshCache => {
            manager.refresh_cache();
            println!("✓ Module cache refreshed");
        }
        ModuleCommands::Validate => {
            handle_module_validate(manager).await?;
        }
    }
    Ok(())
}

pub async fn handle_license_command(
    cmd: LicenseCommands,
    manager: &mut ModuleManager,
) -> eyre::Result<()> {
    match cmd {
        LicenseCommands::Status => {
            handle_license_status(manager).await?;
        }
        LicenseCommands::Validate { key } => {
            handle_license_validate(manager, &key).await?;
        }
        LicenseCommands::ClearCache => {
            manager.clear_license_cache().await;
            println!("✓ License cache cleared, next read will revalidate");
        }
    }
    Ok(())
}

async fn handle_module_list(manager: &mut ModuleManager) -> eyre::Result<()> {
    let modules = manager.list_modules().await?;

    if modules.is_empty() {
        println!("The module catalog is empty.");
        return Ok(());
    }

    println!(
        "{:<22} {:<22} {:<9} {:<9} {:<30}",
        "KEY", "NAME", "ENABLED", "LICENSED", "DEPENDS ON"
    );
    println!("{}", "-".repeat(92));

    for module in modules {
        println!(
            "{:<22} {:<22} {:<9} {:<9} {:<30}",
            module.key,
            module.name,
            if module.enabled { "Yes" } else { "No" },
            if module.licensed { "Yes" } else { "No" },
            if module.dependencies.is_empty() {
                "-".to_string()
            } else {
                module.dependencies.join(", ")
            }
        );
    }

    Ok(())
}

async fn handle_toggle(manager: &mut ModuleManager, key: &str, enable: bool) -> eyre::Result<()> {
    let result = if enable {
        manager.enable_module(key).await
    } else {
        manager.disable_module(key).await
    };

    match result {
        Ok(()) => {
            println!(
                "✓ Module '{}' {}",
                key,
                if enable { "enabled" } else { "disabled" }
            );
            Ok(())
        }
        Err(e) if e.is_user_error() => {
            println!("✗ {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_module_validate(manager: &mut ModuleManager) -> eyre::Result<()> {
    let issues = manager.validate_catalog().await?;

    if issues.is_empty() {
        println!("✓ Catalog is consistent");
        return Ok(());
    }

    println!("{:<22} {:<10} {:<50}", "MODULE", "SEVERITY", "ISSUE");
    println!("{}", "-".repeat(82));
    for issue in issues {
        let severity = match issue.severity {
            IssueSeverity::Info => "Info",
            IssueSeverity::Warning => "Warning",
            IssueSeverity::Error => "Error",
            IssueSeverity::Critical => "Critical",
        };
        println!(
            "{:<22} {:<10} {:<50}",
            issue.module_key, severity, issue.description
        );
    }

    Ok(())
}

async fn handle_license_status(manager: &mut ModuleManager) -> eyre::Result<()> {
    let Some(record) = manager.license_details().await else {
        println!("No license key has been validated yet.");
        println!("Run 'campus license validate <key>' to activate a license.");
        return Ok(());
    };

    println!("Customer:        {}", record.customer_name);
    println!("Email:           {}", record.customer_email);
    println!(
        "Status:          {}",
        if record.valid { "Valid" } else { "Invalid" }
    );
    println!(
        "Expires:         {} ({} days)",
        record.expires_at.format("%Y-%m-%d"),
        manager.days_until_expiration().await
    );
    println!(
        "Support until:   {} ({} days)",
        record.support_expires_at.format("%Y-%m-%d"),
        manager.days_until_support_expiration().await
    );
    println!("Seats:           {}", format_seats(&record.seats));

    if record.entitlements.is_empty() {
        println!("Entitled modules: none");
    } else {
        let entitled: Vec<&str> = record.entitlements.iter().map(String::as_str).collect();
        println!("Entitled modules: {}", entitled.join(", "));
    }

    Ok(())
}

async fn handle_license_validate(manager: &mut ModuleManager, key: &str) -> eyre::Result<()> {
    match manager.validate_license(key).await {
        Ok(record) => {
            println!(
                "✓ License accepted for '{}', {} entitled modules",
                record.customer_name,
                record.entitlements.len()
            );
            Ok(())
        }
        Err(e @ LicensingError::LicenseValidationFailed(_))
        | Err(e @ LicensingError::InvalidLicenseKey(_)) => {
            println!("✗ {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn handle_status(manager: &mut ModuleManager) -> eyre::Result<()> {
    let health = manager.catalog_health().await?;
    let stats = manager.catalog_stats().await?;

    println!(
        "Catalog:  {} ({} modules, {} enabled)",
        if health.healthy { "✓ Healthy" } else { "✗ Unhealthy" },
        stats.total_modules,
        stats.enabled_modules
    );

    match manager.license_details().await {
        Some(record) => {
            println!(
                "License:  {} for '{}', expires in {} days",
                if record.valid { "✓ Valid" } else { "✗ Invalid" },
                record.customer_name,
                manager.days_until_expiration().await
            );
        }
        None => println!("License:  ✗ Not activated"),
    }

    Ok(())
}

fn format_seats(seats: &SeatLimits) -> String {
    fn limit(value: Option<u32>) -> String {
        value.map_or_else(|| "unlimited".to_string(), |v| v.to_string())
    }

    format!(
        "{} students, {} teachers, {} employees",
        limit(seats.max_students),
        limit(seats.max_teachers),
        limit(seats.max_employees)
    )
}
