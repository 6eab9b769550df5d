use purge_common::email::senders::{MockSender, SmtpSender};
use purge_common::email::EmailSender;

use actix_web::web::Data;
use actix_web::{App, HttpServer};
use flexi_logger::{
    Age, Cleanup, Criterion, Duplicate, FileSpec, LogSpecification, Logger, Naming, WriteMode,
};
use std::sync::Arc;

mod env;
mod handlers;
mod middleware;
mod orchestrator;
mod revocation;
mod services;

use handlers::verification_code::VerificationCodeIssuer;
use orchestrator::adapters::{
    PgAuditSink, PgDeletionLedger, PgErasureStore, PgIdentityProvider, PgPlatformStore,
    PgRateLimitStore, PgVerificationCodeStore,
};
use orchestrator::{Collaborators, Orchestrator, OrchestratorConfig};
use revocation::{RevocationClient, RevocationConfig};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let mut port = 9000u16;

    let mut args = std::env::args();

    // Eat the first argument, which is the relative path to the executable
    args.next();

    while let Some(arg) = args.next() {
        match arg.to_lowercase().as_str() {
            "--port" => {
                let port_str = {
                    let next_arg = args.next();

                    match next_arg {
                        Some(s) => s,
                        None => {
                            eprintln!("ERROR: --port option specified but no port was given");
                            std::process::exit(1);
                        }
                    }
                };

                port = {
                    let port_result = port_str.parse::<u16>();

                    match port_result {
                        Ok(p) => p,
                        Err(_) => {
                            eprintln!("ERROR: Incorrect format for port. Integer expected");
                            std::process::exit(1);
                        }
                    }
                };

                continue;
            }
            a => {
                eprintln!("ERROR: Invalid argument: {}", &a);
                std::process::exit(1);
            }
        }
    }

    let base_addr = format!("127.0.0.1:{}", &port);

    let log_spec = LogSpecification::parse(&env::CONF.log_level).unwrap_or_else(|_| {
        eprintln!("WARNING: Invalid log level. Falling back to info");
        LogSpecification::info()
    });

    let _logger = Logger::with(log_spec)
        .log_to_file(FileSpec::default().directory("./logs"))
        .rotate(
            Criterion::Age(Age::Day),
            Naming::Timestamps,
            Cleanup::KeepLogAndCompressedFiles(60, 365),
        )
        .cleanup_in_background_thread(true)
        .duplicate_to_stdout(Duplicate::All)
        .write_mode(WriteMode::Async)
        .format(|writer, now, record| {
            write!(
                writer,
                "{:5} | {} | {}:{} | {}",
                record.level(),
                now.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
                record.module_path().unwrap_or("<unknown>"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .use_utc()
        .start()
        .expect("Failed to start logger");

    let actix_workers = env::CONF.actix_worker_count;

    // To prevent resource starvation, max connections must be at least as large as the number of
    // actix workers
    let db_max_connections = if actix_workers > env::CONF.db_max_connections as usize {
        actix_workers as u32
    } else {
        env::CONF.db_max_connections
    };

    log::info!("Connecting to database...");

    let db_async_pool =
        purge_common::db::create_db_async_pool(&env::CONF.database_uri(), db_max_connections)
            .await;

    log::info!("Successfully connected to database");

    let email_sender: EmailSender = if env::CONF.email_enabled {
        log::info!("Connecting to SMTP relay...");

        let smtp_sender = SmtpSender::with_credentials(
            &env::CONF.smtp_username,
            &env::CONF.smtp_key,
            &env::CONF.smtp_address,
            env::CONF.max_smtp_connections,
            env::CONF.smtp_idle_timeout,
        )
        .expect("Failed to connect to SMTP relay");

        match smtp_sender.test_connection().await {
            Ok(true) => (),
            Ok(false) => panic!("Failed to connect to SMTP relay"),
            Err(e) => panic!("Failed to connect to SMTP relay: {e}"),
        }

        log::info!("Successfully connected to SMTP relay");

        Arc::new(smtp_sender)
    } else {
        log::info!("Emails are disabled. Using mock email sender.");
        Arc::new(MockSender::new())
    };

    let revocation_client = RevocationClient::new(RevocationConfig {
        stripe_client_id: env::CONF.stripe_client_id.clone(),
        stripe_client_secret: env::CONF.stripe_client_secret.clone(),
        timeout: env::CONF.revocation_timeout,
        ..Default::default()
    })
    .expect("Failed to build revocation HTTP client");

    if env::CONF.stripe_client_id.is_none() || env::CONF.stripe_client_secret.is_none() {
        log::warn!(
            "Stripe client credentials are not configured. Stripe tokens will not be revoked"
        );
    }

    let collaborators = Collaborators {
        identity: Arc::new(PgIdentityProvider::new(
            &db_async_pool,
            &env::CONF.token_signing_key,
        )),
        ledger: Arc::new(PgDeletionLedger::new(&db_async_pool)),
        rate_limits: Arc::new(PgRateLimitStore::new(&db_async_pool)),
        codes: Arc::new(PgVerificationCodeStore::new(&db_async_pool)),
        erasure: Arc::new(PgErasureStore::new(&db_async_pool)),
        platforms: Arc::new(PgPlatformStore::new(&db_async_pool)),
        audit: Arc::new(PgAuditSink::new(&db_async_pool)),
        revoker: Arc::new(revocation_client),
    };

    let code_issuer = Data::new(VerificationCodeIssuer::new(
        &collaborators,
        email_sender,
        env::CONF.otp_lifetime,
        env::CONF.email_from_address.clone(),
        env::CONF.email_reply_to_address.clone(),
    ));

    let orchestrator = Data::new(Orchestrator::new(
        collaborators,
        OrchestratorConfig {
            stale_after: env::CONF.deletion_stale_after,
            ..Default::default()
        },
    ));

    HttpServer::new(move || {
        App::new()
            .app_data(orchestrator.clone())
            .app_data(code_issuer.clone())
            .configure(services::api::configure)
            .wrap(actix_web::middleware::Logger::default())
    })
    .workers(actix_workers)
    .bind(base_addr)?
    .run()
    .await?;

    // Safe because all other threads have been joined
    unsafe { env::CONF.zeroize() };

    Ok(())
}
