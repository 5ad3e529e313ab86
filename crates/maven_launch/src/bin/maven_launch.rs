//! Maven Launch CLI
//!
//! Usage:
//!   maven_launch build.yaml
//!   maven_launch build.yaml --build-type full --var project_loc=/ws/app
//!   maven_launch build.yaml --dry-run
//!   maven_launch build.yaml --dry-run --json

use maven_launch::config::default_state_dir;
use maven_launch::{
    ConfiguredComponents, DirectoryRefresher, EventBus, JavaLauncher, JobQueue, LaunchArgs,
    LaunchConfiguration, LaunchEnvironment, LogConsole, MavenLaunchDelegate, Preferences,
    RefreshServices, RuntimeManager, SubstitutionContext,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    let env = env_logger::Env::default().default_filter_or(log_level);
    env_logger::init_from_env(env);

    let state_dir = args.state_dir.clone().unwrap_or_else(default_state_dir);

    // Load preferences
    let preferences_file = args.preferences_file(&state_dir);
    let preferences = match Preferences::load(&preferences_file) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Failed to load preferences: {}", e);
            std::process::exit(1);
        }
    };

    // Load launch configuration
    log::info!("Loading launch configuration: {}", args.config.display());
    let config = match LaunchConfiguration::from_file(&args.config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            log::error!("Failed to load launch configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Substitution variables: preferences first, command line wins
    let mut variables = preferences.variables.clone();
    if let Some(root) = &preferences.workspace_root {
        variables.insert("workspace_loc".to_string(), root.display().to_string());
    }
    variables.extend(args.variables());
    let substitution = Arc::new(SubstitutionContext::new().with_variables(variables));

    let console = Arc::new(LogConsole);
    let bus = Arc::new(EventBus::new());
    let jobs = Arc::new(JobQueue::current());

    let environment = LaunchEnvironment {
        workspace_state_file: preferences.workspace_state_file(&state_dir),
        cli_resolver: preferences.cli_resolver.clone(),
        build_type: args.build_type,
        state_dir,
    };
    let services = RefreshServices {
        bus: bus.clone(),
        jobs: jobs.clone(),
        refresher: Arc::new(DirectoryRefresher::new(
            preferences.workspace_root.clone(),
            substitution.clone(),
        )),
    };
    let java = JavaLauncher::new(
        tokio::runtime::Handle::current(),
        substitution.clone(),
        console.clone(),
        bus,
    );

    let delegate = MavenLaunchDelegate::new(
        java,
        RuntimeManager::from_preferences(&preferences),
        environment,
        services,
    )
    .with_substitution(substitution)
    .with_components(Arc::new(ConfiguredComponents))
    .with_console(console);

    // Dry run mode
    if args.dry_run {
        let prepared = match delegate.prepare(&config) {
            Ok(p) => p,
            Err(e) => {
                log::error!("Failed to assemble launch: {}", e);
                std::process::exit(1);
            }
        };
        let invocation = prepared.invocation.clone();

        // keep the launcher config so the printed command can be run
        match prepared.keep_conf_file() {
            Ok(path) => log::info!("Launcher configuration kept at {}", path.display()),
            Err(e) => {
                log::error!("Failed to keep launcher configuration: {}", e);
                std::process::exit(1);
            }
        }

        if args.json {
            match serde_json::to_string_pretty(&invocation) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    log::error!("Failed to serialize invocation: {}", e);
                    std::process::exit(1);
                }
            }
        } else {
            println!("{}", invocation);
        }
        return;
    }

    let launch = match delegate.launch(config, args.mode) {
        Ok(l) => l,
        Err(e) => {
            log::error!("Launch failed: {}", e);
            std::process::exit(1);
        }
    };

    // Set up Ctrl+C handler
    {
        let processes = launch.processes().to_vec();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, terminating build...");
            for process in &processes {
                process.request_terminate();
            }
        }) {
            log::warn!("Error setting Ctrl+C handler: {}", e);
        }
    }

    launch.wait().await;
    jobs.wait_idle().await;

    let code = launch
        .processes()
        .first()
        .map(|p| p.exit_code().unwrap_or(1))
        .unwrap_or(0);
    log::info!("Maven launch exiting with code {}", code);
    std::process::exit(code);
}
