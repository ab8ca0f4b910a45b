use super::*;
use clap::CommandFactory;
use time::macros::date;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn parse_date_accepts_iso_dates() {
    assert_eq!(parse_date("2025-06-01"), Ok(date!(2025 - 06 - 01)));
    assert_eq!(parse_date(" 2025-12-31 "), Ok(date!(2025 - 12 - 31)));
}

#[test]
fn parse_date_rejects_other_formats() {
    assert!(parse_date("06/01/2025").is_err());
    assert!(parse_date("2025-02-30").is_err());
}

#[test]
fn guess_mime_covers_common_images() {
    assert_eq!(guess_mime("lobby.JPG"), Some("image/jpeg"));
    assert_eq!(guess_mime("pool.png"), Some("image/png"));
    assert_eq!(guess_mime("notes.txt"), None);
    assert_eq!(guess_mime("no-extension"), None);
}

#[test]
fn search_flags_parse_money_and_sort() {
    let cli = Cli::try_parse_from([
        "hotelbook",
        "search",
        "--city",
        "Lisbon",
        "--price-max",
        "120.50",
        "--sort",
        "desc",
        "--rooms-only",
    ])
    .unwrap();
    let Command::Search(args) = cli.command else {
        panic!("expected search command");
    };
    assert_eq!(args.city.as_deref(), Some("Lisbon"));
    assert_eq!(args.price_max, Some(Money::from_cents(12_050)));
    assert!(matches!(args.sort, Some(SortArg::Desc)));
    assert!(args.rooms_only);
}

#[test]
fn booking_create_dates_are_optional_at_parse_time() {
    let cli = Cli::try_parse_from(["hotelbook", "bookings", "create", "9", "--start", "2025-06-01"]).unwrap();
    let Command::Bookings(BookingsCommand { command: BookingsSubcommand::Create { room_id, start, end } }) = cli.command
    else {
        panic!("expected bookings create");
    };
    assert_eq!(room_id, 9);
    assert_eq!(start, Some(date!(2025 - 06 - 01)));
    assert_eq!(end, None);
}

#[test]
fn read_upload_reports_missing_file() {
    let err = read_upload("/definitely/not/here.png").unwrap_err();
    assert!(matches!(err, CliError::ReadFile { .. }));
}

fn booking(id: i64, status: &str) -> BookingDetails {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "room": {
            "id": 7,
            "name": "Sea View",
            "price_per_night": "120.00",
            "is_available": true,
            "type": "Double",
            "hotel": 3,
            "hotel_name": "Grand",
            "hotel_type": "Resort",
            "address": "1 Beach Rd",
            "city": "Nice",
            "country": "France",
            "images": [],
            "preview_image": null,
            "total_bookings": 4
        },
        "user": {"id": 1, "email": "ann@example.test", "groups": ["User"]},
        "start_date": "2024-07-01",
        "end_date": "2024-07-04",
        "created_at": "2024-06-01T10:00:00Z",
        "updated_at": "2024-06-01T10:00:00Z",
        "status": status
    }))
    .unwrap()
}

#[test]
fn booking_lines_carry_nights_and_total_price() {
    let lines = serde_json::to_value(booking_lines(vec![booking(11, "active")])).unwrap();
    let line = &lines[0];
    assert_eq!(line["id"], 11);
    assert_eq!(line["status"], "active");
    assert_eq!(line["nights"], 3);
    assert_eq!(line["total_price"], "360.00");
    assert_eq!(line["room"]["price_per_night"], "120.00");
}

#[test]
fn guests_cancel_only_open_bookings() {
    let list = [booking(1, "active"), booking(2, "confirmed"), booking(3, "cancelled"), booking(4, "rejected")];
    assert!(ensure_cancellable(&list, 1).is_ok());
    assert!(ensure_cancellable(&list, 2).is_ok());
    assert!(matches!(
        ensure_cancellable(&list, 3),
        Err(CliError::BookingLocked { booking_id: 3, ref status, action: "cancelled" }) if status == "cancelled"
    ));
    assert!(matches!(ensure_cancellable(&list, 4), Err(CliError::BookingLocked { booking_id: 4, .. })));
}

#[test]
fn owners_decide_only_active_bookings() {
    let list = [booking(1, "active"), booking(2, "confirmed"), booking(3, "rejected")];
    assert!(ensure_decidable(&list, 1, "confirmed").is_ok());
    let err = ensure_decidable(&list, 2, "rejected").unwrap_err();
    assert_eq!(err.to_string(), "booking 2 is confirmed and cannot be rejected");
    assert!(matches!(ensure_decidable(&list, 3, "confirmed"), Err(CliError::BookingLocked { .. })));
}

#[test]
fn status_checks_reject_unknown_bookings() {
    let list = [booking(1, "active")];
    assert!(matches!(ensure_cancellable(&list, 99), Err(CliError::UnknownBooking(99))));
    assert!(matches!(ensure_decidable(&list, 99, "confirmed"), Err(CliError::UnknownBooking(99))));
}
