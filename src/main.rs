use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local;
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter

use aihub_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{EmailService, GatewayService},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let config = Config::from_toml().expect("Failed to load configuration file");

    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let jwt_service = JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expires_in,
        config.jwt.refresh_token_expires_in,
    );

    let gateway_service = GatewayService::new(config.gateway.clone());
    let email_service = EmailService::new(config.email.clone());

    let token_service = TokenService::new(pool.clone());
    let affiliate_service = AffiliateService::new(pool.clone());
    let transaction_service = TransactionService::new(pool.clone(), affiliate_service.clone());
    let subscription_service = SubscriptionService::new(pool.clone());

    let auth_service = AuthService::new(
        pool.clone(),
        jwt_service.clone(),
        token_service.clone(),
        email_service,
    );

    let payment_service = PaymentService::new(
        pool.clone(),
        token_service.clone(),
        transaction_service.clone(),
        subscription_service.clone(),
        gateway_service,
    );

    // Background reconciler: re-applies side effects for payment tokens that
    // were redeemed but whose transaction never left pending (crash between
    // redeem and credit).
    {
        let payment_service = payment_service.clone();
        let interval = std::time::Duration::from_secs(config.reconciler.interval_secs);
        let lookback_days = config.reconciler.lookback_days;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match payment_service
                    .reconcile_stuck_confirmations(lookback_days)
                    .await
                {
                    Ok(0) => {}
                    Ok(repaired) => {
                        log::info!("Reconciler repaired {repaired} stuck confirmation(s)");
                    }
                    Err(e) => {
                        log::error!("Reconciler pass failed: {e}");
                    }
                }
            }
        });
    }

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(affiliate_service.clone()))
            .app_data(web::Data::new(transaction_service.clone()))
            .app_data(web::Data::new(subscription_service.clone()))
            .app_data(web::Data::new(payment_service.clone()))
            .configure(swagger_config)
            .configure(handlers::webhook_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::auth_config)
                    .configure(handlers::payment_config)
                    .configure(handlers::affiliate_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
