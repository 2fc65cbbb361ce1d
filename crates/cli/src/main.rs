use clap::{Parser, Subcommand};
use hqm_core::{
    config::{
        consultation_minutes_from_env_value, max_conflict_retries_from_env_value,
        serving_policy_from_env_value, store_timeout_from_env_value,
    },
    constants::DEFAULT_QUEUE_DATA_DIR,
    open_store, CoreConfig, Department, LogNotifier, NewPatient, Patient, PatientStatus,
    QueueResult, QueueServices, RecordId, StoreKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hqm")]
#[command(about = "Hospital queue manager CLI")]
struct Cli {
    /// Queue data directory
    #[arg(long, env = "QUEUE_DATA_DIR", default_value = DEFAULT_QUEUE_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all departments
    Departments,
    /// Create a department
    CreateDepartment {
        /// Department name, e.g. Cardiology
        name: String,
        /// Token prefix, e.g. C
        prefix: String,
    },
    /// Register a patient and print their token
    Register {
        name: String,
        age: i64,
        /// Department name
        department: String,
        /// normal (default) or emergency
        #[arg(long)]
        priority: Option<String>,
    },
    /// Show a department queue in service order
    Queue {
        department: String,
        /// waiting (default), serving, completed or cancelled
        #[arg(long)]
        status: Option<String>,
    },
    /// Call the next patient of a department
    Next { department: String },
    /// Show who is being served in a department
    Current { department: String },
    /// Mark a patient's consultation completed
    Complete { patient_id: String },
    /// Cancel a waiting patient
    Cancel { patient_id: String },
    /// Estimate the wait in a department
    WaitTime { department: String },
    /// Look up a patient by token number
    Token { token: String },
}

fn print_department(d: &Department) {
    println!(
        "ID: {}, Name: {}, Prefix: {}, Current token: {}, Active: {}",
        d.id, d.name, d.prefix, d.current_token, d.is_active
    );
}

fn print_patient(p: &Patient) {
    println!(
        "Token: {}, Name: {}, Age: {}, Priority: {}, Status: {}, ID: {}",
        p.token_number, p.name, p.age, p.priority, p.status, p.id
    );
}

fn load_config(data_dir: PathBuf) -> QueueResult<CoreConfig> {
    let env = |name: &str| std::env::var(name).ok();
    CoreConfig::new(
        data_dir,
        consultation_minutes_from_env_value(env("HQM_AVG_CONSULTATION_MINUTES"))?,
        serving_policy_from_env_value(env("HQM_SERVING_POLICY"))?,
        max_conflict_retries_from_env_value(env("HQM_MAX_CONFLICT_RETRIES"))?,
        store_timeout_from_env_value(env("HQM_STORE_TIMEOUT_MS"))?,
    )
}

async fn run(services: &QueueServices, command: Commands) -> QueueResult<()> {
    match command {
        Commands::Departments => {
            let departments = services.departments.list().await?;
            if departments.is_empty() {
                println!("No departments found.");
            }
            for department in &departments {
                print_department(department);
            }
        }
        Commands::CreateDepartment { name, prefix } => {
            let department = services.departments.create(&name, &prefix).await?;
            print_department(&department);
        }
        Commands::Register {
            name,
            age,
            department,
            priority,
        } => {
            let patient = services
                .patients
                .register(NewPatient {
                    name,
                    age,
                    department,
                    priority,
                })
                .await?;
            println!(
                "Registered with token {} (estimated wait {} min)",
                patient.token_number, patient.estimated_wait_time
            );
        }
        Commands::Queue { department, status } => {
            let status = match status {
                Some(s) => s.parse()?,
                None => PatientStatus::Waiting,
            };
            let queue = services.queue.list_queue(&department, status).await?;
            if queue.is_empty() {
                println!("No {} patients in {}.", status, department);
            }
            for patient in &queue {
                print_patient(patient);
            }
        }
        Commands::Next { department } => match services.queue.call_next(&department).await? {
            Some(patient) => print_patient(&patient),
            None => println!("Nobody is waiting in {}.", department),
        },
        Commands::Current { department } => {
            match services.queue.current_serving(&department).await? {
                Some(patient) => print_patient(&patient),
                None => println!("Nobody is being served in {}.", department),
            }
        }
        Commands::Complete { patient_id } => {
            let id = RecordId::parse(&patient_id)?;
            let patient = services.queue.mark_completed(&id).await?;
            print_patient(&patient);
        }
        Commands::Cancel { patient_id } => {
            let id = RecordId::parse(&patient_id)?;
            let patient = services.patients.cancel(&id).await?;
            print_patient(&patient);
        }
        Commands::WaitTime { department } => {
            let estimate = services.queue.estimate_wait_time(&department).await?;
            println!(
                "{} waiting in {}, estimated wait {} min",
                estimate.waiting, department, estimate.minutes
            );
        }
        Commands::Token { token } => {
            let patient = services.patients.by_token(&token).await?;
            print_patient(&patient);
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hqm_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("No command given. Use --help for usage.");
        return Ok(());
    };

    let cfg = Arc::new(load_config(cli.data_dir)?);
    let store = open_store(StoreKind::File, &cfg)?;
    let services = QueueServices::new(store, Arc::new(LogNotifier), cfg);

    if let Err(e) = run(&services, command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
