// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    apple_signing_credentials::{
        certificate::CertificateDetails,
        local_credentials::LocalCredentialsFile,
        provisioning_profile::parse_profile,
        settings::ReconcileSettings,
        validation::{validate_locally, Validation},
        CredentialsError,
    },
    chrono::Utc,
    clap::{Arg, ArgMatches, Command},
    log::{warn, LevelFilter},
};

const INSPECT_CERTIFICATE_ABOUT: &str = "\
Print information about a distribution certificate.

Given the path to a PKCS#12 (.p12) container holding a distribution
certificate, this command prints the certificate's SHA-1 fingerprint,
serial number, validity window, and Apple team.

The fingerprint is the value provisioning profiles are matched against.
";

const INSPECT_PROFILE_ABOUT: &str = "\
Print information about a provisioning profile.

The profile may be a signed .mobileprovision file or a bare property list.
";

const VALIDATE_ABOUT: &str = "\
Check that a distribution certificate and provisioning profile can be used
together to sign an application.

The profile must embed the certificate, its application identifier must
match the bundle identifier, and it must not be expired. Nothing is sent
to the Apple Developer Portal.

The process exits with a non-zero exit code if validation fails.
";

const VALIDATE_LOCAL_CREDENTIALS_ABOUT: &str = "\
Validate the credentials described by a credentials.json file.

Paths in the file are resolved relative to the file's directory. When the
file defines credentials for multiple targets, --target selects one.
";

const PRINT_SETTINGS_ABOUT: &str = "\
Print the effective reconciliation settings as JSON.

Settings are read from --config if given, then overlaid with the
RSIGNCREDS_NON_INTERACTIVE, RSIGNCREDS_FREEZE_CREDENTIALS, and
RSIGNCREDS_AUTH_MODE environment variables.
";

fn add_p12_args(app: Command) -> Command {
    app.arg(
        Arg::new("p12_path")
            .long("p12-file")
            .alias("pfx-file")
            .takes_value(true)
            .required(true)
            .help("Path to a .p12/PFX file containing the distribution certificate"),
    )
    .arg(
        Arg::new("p12_password")
            .long("p12-password")
            .takes_value(true)
            .conflicts_with("p12_password_file")
            .help("The password to use to open the --p12-file file"),
    )
    .arg(
        Arg::new("p12_password_file")
            .long("p12-password-file")
            .takes_value(true)
            .conflicts_with("p12_password")
            .help("Path to file containing password for opening --p12-file file"),
    )
}

/// Read a PKCS#12 container and its password from arguments.
fn p12_from_args(args: &ArgMatches) -> Result<(Vec<u8>, String), CredentialsError> {
    let p12_path = args
        .value_of("p12_path")
        .ok_or(CredentialsError::CliBadArgument)?;
    let p12_data = std::fs::read(p12_path)?;

    let p12_password = if let Some(password) = args.value_of("p12_password") {
        password.to_string()
    } else if let Some(path) = args.value_of("p12_password_file") {
        std::fs::read_to_string(path)?
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    } else {
        dialoguer::Password::new()
            .with_prompt("Please enter password for p12 file")
            .allow_empty_password(true)
            .interact()?
    };

    Ok((p12_data, p12_password))
}

fn print_certificate_details(details: &CertificateDetails) {
    println!("Fingerprint:   {}", details.fingerprint);
    println!("Serial number: {}", details.serial_number);
    println!(
        "Common name:   {}",
        details.common_name.as_deref().unwrap_or("(none)")
    );
    println!(
        "Team ID:       {}",
        details.team_id.as_deref().unwrap_or("(none)")
    );
    println!("Not before:    {}", details.not_before.to_rfc3339());
    println!("Not after:     {}", details.not_after.to_rfc3339());
}

fn command_inspect_certificate(args: &ArgMatches) -> Result<(), CredentialsError> {
    let (p12_data, p12_password) = p12_from_args(args)?;

    let details = CertificateDetails::from_pkcs12(&p12_data, &p12_password)?;
    print_certificate_details(&details);

    if !details.is_valid_at(Utc::now()) {
        warn!("certificate is outside of its validity window");
    }

    Ok(())
}

fn command_inspect_profile(args: &ArgMatches) -> Result<(), CredentialsError> {
    let path = args
        .value_of("path")
        .ok_or(CredentialsError::CliBadArgument)?;

    let profile = parse_profile(&std::fs::read(path)?)?;

    println!("Name:                   {}", profile.name.as_deref().unwrap_or("(none)"));
    println!("UUID:                   {}", profile.uuid.as_deref().unwrap_or("(none)"));
    println!(
        "Application identifier: {}",
        profile.application_identifier.as_deref().unwrap_or("(none)")
    );
    println!("Team identifiers:       {}", profile.team_identifiers.join(", "));
    println!("Expires:                {}", profile.expires_at.to_rfc3339());
    println!("Provisions all devices: {}", profile.provisions_all_devices);
    println!("Certificates:");
    for fingerprint in &profile.certificate_fingerprints {
        println!("  {}", fingerprint);
    }
    if !profile.provisioned_devices.is_empty() {
        println!("Provisioned devices:");
        for device in &profile.provisioned_devices {
            println!("  {}", device);
        }
    }

    if profile.is_expired_at(Utc::now()) {
        warn!("profile has expired");
    }

    Ok(())
}

fn command_validate(args: &ArgMatches) -> Result<(), CredentialsError> {
    let profile_path = args
        .value_of("profile")
        .ok_or(CredentialsError::CliBadArgument)?;
    let bundle_identifier = args
        .value_of("bundle_identifier")
        .ok_or(CredentialsError::CliBadArgument)?;

    let (p12_data, p12_password) = p12_from_args(args)?;
    let details = CertificateDetails::from_pkcs12(&p12_data, &p12_password)?;
    let content = std::fs::read(profile_path)?;

    match validate_locally(
        &content,
        &details.fingerprint,
        bundle_identifier,
        Utc::now(),
    ) {
        Validation::Ok => {
            println!("{} is valid for {}", profile_path, bundle_identifier);
            Ok(())
        }
        Validation::Invalid(reason) => Err(CredentialsError::CliGeneralError(format!(
            "{} is not valid for {}: {}",
            profile_path, bundle_identifier, reason
        ))),
    }
}

fn command_validate_local_credentials(args: &ArgMatches) -> Result<(), CredentialsError> {
    let path = args
        .value_of("path")
        .ok_or(CredentialsError::CliBadArgument)?;
    let bundle_identifier = args
        .value_of("bundle_identifier")
        .ok_or(CredentialsError::CliBadArgument)?;

    let file = LocalCredentialsFile::from_path(path)?;
    let credentials = file.resolve(args.value_of("target"), bundle_identifier, Utc::now())?;

    print_certificate_details(credentials.certificate.details()?);
    println!("Profile:       {}", credentials.profile.id);
    println!();
    println!("credentials are valid for {}", bundle_identifier);

    Ok(())
}

fn command_print_settings(args: &ArgMatches) -> Result<(), CredentialsError> {
    let mut settings = if let Some(path) = args.value_of("config") {
        ReconcileSettings::from_json_path(path)?
    } else {
        ReconcileSettings::default()
    };

    settings.apply_env(|key| std::env::var(key).ok())?;

    println!("{}", serde_json::to_string_pretty(&settings)?);

    Ok(())
}

fn main_impl() -> Result<(), CredentialsError> {
    let app = Command::new("Apple signing credentials reconciliation")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and validate Apple distribution signing credentials")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(add_p12_args(
        Command::new("inspect-certificate")
            .about("Print information about a distribution certificate")
            .long_about(INSPECT_CERTIFICATE_ABOUT),
    ));

    let app = app.subcommand(
        Command::new("inspect-profile")
            .about("Print information about a provisioning profile")
            .long_about(INSPECT_PROFILE_ABOUT)
            .arg(
                Arg::new("path")
                    .required(true)
                    .help("Path to provisioning profile to inspect"),
            ),
    );

    let app = app.subcommand(add_p12_args(
        Command::new("validate")
            .about("Validate a certificate and provisioning profile pair")
            .long_about(VALIDATE_ABOUT)
            .arg(
                Arg::new("profile")
                    .long("profile")
                    .takes_value(true)
                    .required(true)
                    .help("Path to provisioning profile"),
            )
            .arg(
                Arg::new("bundle_identifier")
                    .long("bundle-id")
                    .takes_value(true)
                    .required(true)
                    .help("Bundle identifier of the application to be signed"),
            ),
    ));

    let app = app.subcommand(
        Command::new("validate-local-credentials")
            .about("Validate credentials described by a credentials.json file")
            .long_about(VALIDATE_LOCAL_CREDENTIALS_ABOUT)
            .arg(
                Arg::new("path")
                    .required(true)
                    .help("Path to credentials.json"),
            )
            .arg(
                Arg::new("bundle_identifier")
                    .long("bundle-id")
                    .takes_value(true)
                    .required(true)
                    .help("Bundle identifier of the application to be signed"),
            )
            .arg(
                Arg::new("target")
                    .long("target")
                    .takes_value(true)
                    .help("Name of the target whose credentials to validate"),
            ),
    );

    let app = app.subcommand(
        Command::new("print-settings")
            .about("Print the effective reconciliation settings")
            .long_about(PRINT_SETTINGS_ABOUT)
            .arg(
                Arg::new("config")
                    .long("config")
                    .takes_value(true)
                    .help("Path to a JSON settings file"),
            ),
    );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("inspect-certificate", args)) => command_inspect_certificate(args),
        Some(("inspect-profile", args)) => command_inspect_profile(args),
        Some(("print-settings", args)) => command_print_settings(args),
        Some(("validate", args)) => command_validate(args),
        Some(("validate-local-credentials", args)) => command_validate_local_credentials(args),
        _ => Err(CredentialsError::CliUnknownCommand),
    }
}

fn main() {
    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            1
        }
    };

    std::process::exit(exit_code)
}
