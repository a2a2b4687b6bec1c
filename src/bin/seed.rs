use chrono::{Duration, NaiveTime, Utc};
use clap::Parser;
use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use gymdesk::{
    domain::{
        BillingInterval, ClassSession, ClassStatus, CreatePlanRequest, CreateUserRequest, MemberProfile,
        Role, Subscription, SubscriptionStatus, TrainerProfile,
    },
    repository::{
        ClassRepository, PlanRepository, SqliteClassRepository, SqlitePlanRepository,
        SqliteSubscriptionRepository, SqliteUserRepository, SubscriptionRepository, UserRepository,
    },
};

/// Fills a database with demo users, plans and a week of classes.
#[derive(Debug, Parser)]
#[command(name = "seed", version)]
struct Args {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://gymdesk.db?mode=rwc")]
    database_url: String,

    /// Number of members to create.
    #[arg(long, default_value_t = 20)]
    members: usize,
}

const CLASS_TYPES: &[(&str, &str, i64)] = &[
    ("Morning HIIT", "Studio A", 12),
    ("Vinyasa Flow", "Studio B", 20),
    ("Strength Fundamentals", "Weights Room", 8),
    ("Spin", "Cycle Studio", 16),
];

fn slug(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!("🌱 Seeding {}", args.database_url);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let user_repo = SqliteUserRepository::new(db_pool.clone());
    let plan_repo = SqlitePlanRepository::new(db_pool.clone());
    let subscription_repo = SqliteSubscriptionRepository::new(db_pool.clone());
    let class_repo = SqliteClassRepository::new(db_pool.clone());

    println!("👥 Creating staff...");
    user_repo.create(CreateUserRequest {
        email: "admin@gymdesk.local".to_string(),
        full_name: "Front Desk Admin".to_string(),
        password: "admin12345".to_string(),
        phone: None,
        role: Role::Admin,
    }).await?;

    let mut trainers = Vec::new();
    for (i, specialization) in ["Strength & Conditioning", "Yoga"].iter().enumerate() {
        let first: String = FirstName().fake();
        let last: String = LastName().fake();
        let trainer = user_repo.create(CreateUserRequest {
            email: format!("trainer{}@gymdesk.local", i + 1),
            full_name: format!("{} {}", first, last),
            password: "password123".to_string(),
            phone: None,
            role: Role::Trainer(TrainerProfile {
                specialization: Some(specialization.to_string()),
                experience_years: Some((2..15).fake()),
            }),
        }).await?;
        trainers.push(trainer);
    }
    println!("  ✅ Created admin and {} trainers", trainers.len());

    println!("💳 Creating plans...");
    let monthly = plan_repo.create(CreatePlanRequest {
        name: "Monthly Unlimited".to_string(),
        description: "Unlimited classes, billed monthly".to_string(),
        price_cents: 5900,
        currency: "usd".to_string(),
        interval: BillingInterval::Month,
        stripe_price_id: "price_seed_monthly".to_string(),
        stripe_product_id: None,
        features: vec!["Unlimited classes".to_string(), "Open gym access".to_string()],
        classes_per_month: 0,
    }).await?;
    plan_repo.create(CreatePlanRequest {
        name: "Annual Unlimited".to_string(),
        description: "Unlimited classes, billed yearly".to_string(),
        price_cents: 59000,
        currency: "usd".to_string(),
        interval: BillingInterval::Year,
        stripe_price_id: "price_seed_annual".to_string(),
        stripe_product_id: None,
        features: vec!["Unlimited classes".to_string(), "Two guest passes a month".to_string()],
        classes_per_month: 0,
    }).await?;

    println!("🏋️ Creating {} members...", args.members);
    let now = Utc::now();
    for i in 0..args.members {
        let first: String = FirstName().fake();
        let last: String = LastName().fake();
        let member = user_repo.create(CreateUserRequest {
            email: format!("{}.{}{}@example.com", slug(&first), slug(&last), i),
            full_name: format!("{} {}", first, last),
            password: "password123".to_string(),
            phone: None,
            role: Role::Member(MemberProfile {
                fitness_goals: Some(Sentence(3..8).fake()),
                health_notes: None,
            }),
        }).await?;

        subscription_repo.create(Subscription {
            id: Uuid::new_v4(),
            user_id: member.id,
            plan_id: Some(monthly.id),
            stripe_customer_id: None,
            stripe_subscription_id: format!("manual_seed_{}", Uuid::new_v4().simple()),
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now + Duration::days(30),
            cancel_at_period_end: false,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }).await?;
    }
    println!("  ✅ Created {} members with active subscriptions", args.members);

    println!("📅 Creating a week of classes...");
    let slots = [(7, 0), (12, 15), (18, 30)];
    let mut created = 0;
    for day in 1..=7 {
        let date = (now + Duration::days(day)).date_naive();
        for (slot, (hour, minute)) in slots.iter().enumerate() {
            let Some(time) = NaiveTime::from_hms_opt(*hour, *minute, 0) else {
                continue;
            };
            let (name, location, capacity) = CLASS_TYPES[(day as usize + slot) % CLASS_TYPES.len()];
            let trainer = &trainers[(day as usize + slot) % trainers.len()];
            let start_time = date.and_time(time).and_utc();

            class_repo.create(ClassSession {
                id: Uuid::new_v4(),
                trainer_id: trainer.id,
                name: name.to_string(),
                description: None,
                start_time,
                end_time: start_time + Duration::minutes(50),
                capacity,
                location: Some(location.to_string()),
                status: ClassStatus::Scheduled,
                created_at: now,
                updated_at: now,
            }).await?;
            created += 1;
        }
    }
    println!("  ✅ Created {} classes", created);

    println!("\n✨ Database seeding complete!");
    println!("\n📝 Test credentials:");
    println!("  Admin: admin@gymdesk.local / admin12345");
    println!("  Trainers: trainer1@gymdesk.local, trainer2@gymdesk.local / password123");
    println!("  Members: password123");

    Ok(())
}
