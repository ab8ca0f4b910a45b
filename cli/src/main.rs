#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::path::Path;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hotelbook::config::{ClientConfig, ConfigError, DEFAULT_BASE_URL, Timeouts};
use hotelbook::forms::{FormError, RegistrationForm, booking_request};
use hotelbook::net::hotels::{HotelForm, SearchQuery, SortOrder};
use hotelbook::net::profiles::ProfileForm;
use hotelbook::net::rooms::RoomForm;
use hotelbook::net::transport::Upload;
use hotelbook::net::types::{BookingDetails, DATE_FORMAT, User};
use hotelbook::net::{Gateway, NetworkError, api, bookings, hotels, profiles, rooms};
use hotelbook::pricing::{Money, total_price};
use hotelbook::state::guard::{Guard, require_login, require_tenant};
use hotelbook::state::SessionStore;
use serde::Serialize;
use time::Date;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("request failed: {0}")]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("this command needs a session; pass --email and --password or set HOTELBOOK_EMAIL/HOTELBOOK_PASSWORD")]
    NotLoggedIn,
    #[error("this command is only available to Tenant accounts")]
    NotTenant,
    #[error("failed to read {path}: {source}")]
    ReadFile { path: String, source: std::io::Error },
    #[error("booking {0} is not in your booking list")]
    UnknownBooking(i64),
    #[error("booking {booking_id} is {status} and cannot be {action}")]
    BookingLocked { booking_id: i64, status: String, action: &'static str },
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "hotelbook", about = "Hotel booking backend CLI")]
struct Cli {
    #[arg(long, env = "HOTELBOOK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "HOTELBOOK_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "HOTELBOOK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, env = "HOTELBOOK_REQUEST_TIMEOUT_SECS", default_value_t = hotelbook::config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    #[arg(long, env = "HOTELBOOK_CONNECT_TIMEOUT_SECS", default_value_t = hotelbook::config::DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the signed-in user.
    Whoami,
    /// Sign in, then sign out again.
    Logout,
    Register(RegisterArgs),
    Hotels(HotelsCommand),
    Rooms(RoomsCommand),
    Search(SearchArgs),
    Bookings(BookingsCommand),
    Profile(ProfileCommand),
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long = "new-email")]
    email: String,
    #[arg(long = "new-password")]
    password: String,
    #[arg(long = "repeat-password")]
    password_repeat: String,
    #[arg(long, default_value = "User")]
    group: String,
    #[arg(long)]
    phone: Option<String>,
}

#[derive(Args, Debug)]
struct HotelsCommand {
    #[command(subcommand)]
    command: HotelsSubcommand,
}

#[derive(Subcommand, Debug)]
enum HotelsSubcommand {
    List,
    Show { hotel_id: i64 },
    /// Hotels owned by the signed-in tenant.
    Mine,
    Types,
    Create(HotelArgs),
    Update {
        hotel_id: i64,
        #[command(flatten)]
        hotel: HotelArgs,
    },
    Delete { hotel_id: i64 },
    DeleteImage { image_id: i64 },
}

#[derive(Args, Debug)]
struct HotelArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    address: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    country: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long = "type")]
    kind: String,
    #[arg(long)]
    preview: Option<String>,
    /// Extra gallery images; repeat the flag for each file.
    #[arg(long = "image")]
    images: Vec<String>,
}

#[derive(Args, Debug)]
struct RoomsCommand {
    #[command(subcommand)]
    command: RoomsSubcommand,
}

#[derive(Subcommand, Debug)]
enum RoomsSubcommand {
    Show { room_id: i64 },
    Types,
    Create(RoomArgs),
    Update {
        room_id: i64,
        #[command(flatten)]
        room: RoomArgs,
    },
    Delete { room_id: i64 },
    DeleteImage { image_id: i64 },
    /// Price a stay without booking it.
    Quote {
        room_id: i64,
        #[arg(long, value_parser = parse_date)]
        start: Date,
        #[arg(long, value_parser = parse_date)]
        end: Date,
    },
}

#[derive(Args, Debug)]
struct RoomArgs {
    #[arg(long)]
    hotel: i64,
    #[arg(long)]
    name: String,
    #[arg(long = "type")]
    kind: String,
    #[arg(long)]
    price: Money,
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    available: bool,
    #[arg(long)]
    preview: Option<String>,
    #[arg(long = "image")]
    images: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Asc,
    Desc,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long)]
    hotel: Option<String>,
    #[arg(long)]
    hotel_type: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    room: Option<String>,
    #[arg(long)]
    room_type: Option<String>,
    #[arg(long)]
    price_min: Option<Money>,
    #[arg(long)]
    price_max: Option<Money>,
    #[arg(long, value_parser = parse_date)]
    start: Option<Date>,
    #[arg(long, value_parser = parse_date)]
    end: Option<Date>,
    #[arg(long, value_enum)]
    sort: Option<SortArg>,
    #[arg(long, default_value_t = false)]
    rooms_only: bool,
}

#[derive(Args, Debug)]
struct BookingsCommand {
    #[command(subcommand)]
    command: BookingsSubcommand,
}

#[derive(Subcommand, Debug)]
enum BookingsSubcommand {
    /// Bookings made by the signed-in guest.
    Mine,
    /// Bookings on rooms owned by the signed-in tenant.
    Owner,
    Create {
        room_id: i64,
        #[arg(long, value_parser = parse_date)]
        start: Option<Date>,
        #[arg(long, value_parser = parse_date)]
        end: Option<Date>,
    },
    Cancel { booking_id: i64 },
    Confirm { booking_id: i64 },
    Reject { booking_id: i64 },
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Me,
    Show { profile_id: i64 },
    /// Edit the signed-in user's profile; unset flags keep current values.
    Update {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long, value_parser = parse_date)]
        birth_date: Option<Date>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        picture: Option<String>,
    },
}

#[derive(Serialize)]
struct Quote {
    room_id: i64,
    nights: u32,
    price_per_night: Money,
    total_price: Money,
}

/// A listed booking with its stay length and price filled in.
#[derive(Serialize)]
struct BookingLine {
    #[serde(flatten)]
    booking: BookingDetails,
    nights: u32,
    total_price: Money,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring unreadable .env: {e}");
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::new(
        &cli.base_url,
        Timeouts { request_secs: cli.request_timeout_secs, connect_secs: cli.connect_timeout_secs },
    )?;
    let gateway = Gateway::from_config(&config)?;
    let session = SessionStore::mount(gateway).await;
    tracing::debug!(base_url = %config.base_url, logged_in = session.is_logged_in(), "session mounted");

    if let (Some(email), Some(password)) = (cli.email.as_deref(), cli.password.as_deref()) {
        session.login(email, password).await?;
    }

    match cli.command {
        Command::Whoami => print_json(&signed_in(&session)?),
        Command::Logout => {
            signed_in(&session)?;
            session.logout().await;
            print_json(&serde_json::json!({ "logged_in": session.is_logged_in() }))
        }
        Command::Register(args) => run_register(&session, args).await,
        Command::Hotels(cmd) => run_hotels(&session, cmd.command).await,
        Command::Rooms(cmd) => run_rooms(&session, cmd.command).await,
        Command::Search(args) => run_search(&session, args).await,
        Command::Bookings(cmd) => run_bookings(&session, cmd.command).await,
        Command::Profile(cmd) => run_profile(&session, cmd.command).await,
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

async fn run_register(session: &SessionStore, args: RegisterArgs) -> Result<(), CliError> {
    let registration = RegistrationForm {
        email: args.email,
        password: args.password,
        password_repeat: args.password_repeat,
        group_name: args.group,
        phone: args.phone,
    }
    .validate()?;
    let user = api::register(session.gateway(), &registration).await?;
    print_json(&user)
}

async fn run_hotels(session: &SessionStore, command: HotelsSubcommand) -> Result<(), CliError> {
    let gateway = session.gateway();
    match command {
        HotelsSubcommand::List => print_json(&hotels::list_hotels(gateway).await?),
        HotelsSubcommand::Show { hotel_id } => print_json(&hotels::get_hotel(gateway, hotel_id).await?),
        HotelsSubcommand::Types => print_json(&hotels::hotel_types(gateway).await?),
        HotelsSubcommand::Mine => {
            tenant(session)?;
            print_json(&hotels::my_hotels(gateway).await?)
        }
        HotelsSubcommand::Create(args) => {
            tenant(session)?;
            let (form, images) = hotel_form(args)?;
            print_json(&hotels::create_hotel(gateway, form, images).await?)
        }
        HotelsSubcommand::Update { hotel_id, hotel } => {
            tenant(session)?;
            let (form, images) = hotel_form(hotel)?;
            print_json(&hotels::update_hotel(gateway, hotel_id, form, images).await?)
        }
        HotelsSubcommand::Delete { hotel_id } => {
            tenant(session)?;
            hotels::delete_hotel(gateway, hotel_id).await?;
            print_json(&serde_json::json!({ "deleted": hotel_id }))
        }
        HotelsSubcommand::DeleteImage { image_id } => {
            tenant(session)?;
            hotels::delete_hotel_image(gateway, image_id).await?;
            print_json(&serde_json::json!({ "deleted": image_id }))
        }
    }
}

async fn run_rooms(session: &SessionStore, command: RoomsSubcommand) -> Result<(), CliError> {
    let gateway = session.gateway();
    match command {
        RoomsSubcommand::Show { room_id } => print_json(&rooms::get_room(gateway, room_id).await?),
        RoomsSubcommand::Types => print_json(&rooms::room_types(gateway).await?),
        RoomsSubcommand::Create(args) => {
            tenant(session)?;
            let (form, images) = room_form(args)?;
            print_json(&rooms::create_room(gateway, form, images).await?)
        }
        RoomsSubcommand::Update { room_id, room } => {
            tenant(session)?;
            let (form, images) = room_form(room)?;
            print_json(&rooms::update_room(gateway, room_id, form, images).await?)
        }
        RoomsSubcommand::Delete { room_id } => {
            tenant(session)?;
            rooms::delete_room(gateway, room_id).await?;
            print_json(&serde_json::json!({ "deleted": room_id }))
        }
        RoomsSubcommand::DeleteImage { image_id } => {
            tenant(session)?;
            rooms::delete_room_image(gateway, image_id).await?;
            print_json(&serde_json::json!({ "deleted": image_id }))
        }
        RoomsSubcommand::Quote { room_id, start, end } => {
            let room = rooms::get_room(gateway, room_id).await?;
            print_json(&Quote {
                room_id,
                nights: hotelbook::pricing::nights(start, end),
                price_per_night: room.price_per_night,
                total_price: total_price(room.price_per_night, start, end),
            })
        }
    }
}

async fn run_search(session: &SessionStore, args: SearchArgs) -> Result<(), CliError> {
    let query = SearchQuery {
        hotel: args.hotel,
        hotel_type: args.hotel_type,
        country: args.country,
        city: args.city,
        room: args.room,
        room_type: args.room_type,
        price_min: args.price_min,
        price_max: args.price_max,
        start_date: args.start,
        end_date: args.end,
        sort: args.sort.map(|sort| match sort {
            SortArg::Asc => SortOrder::PriceAscending,
            SortArg::Desc => SortOrder::PriceDescending,
        }),
        rooms_only: args.rooms_only,
    };
    print_json(&hotels::search(session.gateway(), &query).await?)
}

async fn run_bookings(session: &SessionStore, command: BookingsSubcommand) -> Result<(), CliError> {
    let gateway = session.gateway();
    match command {
        BookingsSubcommand::Mine => {
            signed_in(session)?;
            print_json(&booking_lines(bookings::my_bookings(gateway).await?))
        }
        BookingsSubcommand::Owner => {
            tenant(session)?;
            print_json(&booking_lines(bookings::owner_bookings(gateway).await?))
        }
        BookingsSubcommand::Create { room_id, start, end } => {
            let user = signed_in(session)?;
            let request = booking_request(&user, room_id, start, end)?;
            print_json(&bookings::create_booking(gateway, &request).await?)
        }
        BookingsSubcommand::Cancel { booking_id } => {
            signed_in(session)?;
            ensure_cancellable(&bookings::my_bookings(gateway).await?, booking_id)?;
            print_json(&bookings::cancel(gateway, booking_id).await?)
        }
        BookingsSubcommand::Confirm { booking_id } => {
            tenant(session)?;
            ensure_decidable(&bookings::owner_bookings(gateway).await?, booking_id, "confirmed")?;
            print_json(&bookings::confirm(gateway, booking_id).await?)
        }
        BookingsSubcommand::Reject { booking_id } => {
            tenant(session)?;
            ensure_decidable(&bookings::owner_bookings(gateway).await?, booking_id, "rejected")?;
            print_json(&bookings::reject(gateway, booking_id).await?)
        }
    }
}

async fn run_profile(session: &SessionStore, command: ProfileSubcommand) -> Result<(), CliError> {
    let gateway = session.gateway();
    match command {
        ProfileSubcommand::Me => {
            signed_in(session)?;
            print_json(&profiles::my_profile(gateway).await?)
        }
        ProfileSubcommand::Show { profile_id } => print_json(&profiles::get_profile(gateway, profile_id).await?),
        ProfileSubcommand::Update { username, bio, birth_date, location, picture } => {
            signed_in(session)?;
            let current = profiles::my_profile(gateway).await?;
            let mut form = ProfileForm::from_profile(&current);
            if let Some(username) = username {
                form.username = username;
            }
            form.bio = bio.or(form.bio);
            form.birth_date = birth_date.or(form.birth_date);
            form.location = location.or(form.location);
            form.profile_picture = picture.as_deref().map(read_upload).transpose()?;
            print_json(&profiles::update_profile(gateway, current.id, form).await?)
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn signed_in(session: &SessionStore) -> Result<User, CliError> {
    let state = session.snapshot();
    match (require_login(&state), state.user) {
        (Guard::Allow, Some(user)) => Ok(user),
        _ => Err(CliError::NotLoggedIn),
    }
}

fn tenant(session: &SessionStore) -> Result<User, CliError> {
    let user = signed_in(session)?;
    match require_tenant(&session.snapshot()) {
        Guard::Allow => Ok(user),
        _ => Err(CliError::NotTenant),
    }
}

fn booking_lines(list: Vec<BookingDetails>) -> Vec<BookingLine> {
    list.into_iter()
        .map(|booking| BookingLine { nights: booking.nights(), total_price: booking.total_price(), booking })
        .collect()
}

fn find_booking(list: &[BookingDetails], booking_id: i64) -> Result<&BookingDetails, CliError> {
    list.iter().find(|b| b.id == booking_id).ok_or(CliError::UnknownBooking(booking_id))
}

/// Guests may not cancel a booking that is already cancelled or rejected.
fn ensure_cancellable(list: &[BookingDetails], booking_id: i64) -> Result<(), CliError> {
    let booking = find_booking(list, booking_id)?;
    if booking.status.guest_can_cancel() {
        return Ok(());
    }
    Err(CliError::BookingLocked { booking_id, status: booking.status.as_str().to_owned(), action: "cancelled" })
}

/// Owners decide only on bookings still awaiting a decision.
fn ensure_decidable(list: &[BookingDetails], booking_id: i64, action: &'static str) -> Result<(), CliError> {
    let booking = find_booking(list, booking_id)?;
    if booking.status.owner_can_decide() {
        return Ok(());
    }
    Err(CliError::BookingLocked { booking_id, status: booking.status.as_str().to_owned(), action })
}

fn hotel_form(args: HotelArgs) -> Result<(HotelForm, Vec<Upload>), CliError> {
    let form = HotelForm {
        name: args.name,
        address: args.address,
        city: args.city,
        country: args.country,
        description: args.description,
        kind: args.kind,
        preview_image: args.preview.as_deref().map(read_upload).transpose()?,
    };
    Ok((form, read_uploads(&args.images)?))
}

fn room_form(args: RoomArgs) -> Result<(RoomForm, Vec<Upload>), CliError> {
    let form = RoomForm {
        hotel: args.hotel,
        name: args.name,
        kind: args.kind,
        price_per_night: args.price,
        is_available: args.available,
        preview_image: args.preview.as_deref().map(read_upload).transpose()?,
    };
    Ok((form, read_uploads(&args.images)?))
}

fn read_uploads(paths: &[String]) -> Result<Vec<Upload>, CliError> {
    paths.iter().map(|path| read_upload(path)).collect()
}

fn read_upload(path: &str) -> Result<Upload, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::ReadFile { path: path.to_owned(), source })?;
    let filename = Path::new(path)
        .file_name()
        .map_or_else(|| path.to_owned(), |name| name.to_string_lossy().into_owned());
    Ok(Upload { mime: guess_mime(&filename).map(str::to_owned), filename, bytes })
}

fn guess_mime(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Result<Date, String> {
    Date::parse(raw.trim(), DATE_FORMAT).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
