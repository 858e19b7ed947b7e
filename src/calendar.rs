use crate::config::CalendarSettings;
use crate::domain::{Booking, ResourceFilter};
use crate::error::CalendarError;
use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    pub day: u32,
    /// False for the blank cells that belong to the previous/next month.
    pub in_month: bool,
}

/// The part of one booking that falls inside one week row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment<'a> {
    pub booking: &'a Booking,
    /// Monday = 0.
    pub start_col: u8,
    pub end_col: u8,
    pub row: usize,
    pub is_start: bool,
    pub is_end: bool,
}

impl Segment<'_> {
    pub fn overlaps(&self, other: &Segment<'_>) -> bool {
        self.start_col <= other.end_col && other.start_col <= self.end_col
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Week<'a> {
    pub start: NaiveDate,
    pub days: Vec<DayCell>,
    pub segments: Vec<Segment<'a>>,
    /// Number of lanes in use; drives the rendered height of the row.
    pub rows: usize,
}

impl Week<'_> {
    pub fn date_at(&self, col: u8) -> NaiveDate {
        self.days[col as usize].date
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthLayout<'a> {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<Week<'a>>,
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), CalendarError> {
    let invalid = CalendarError::InvalidMonth { year, month };
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or(invalid.clone())?;
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let last = NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .ok_or(invalid)?;
    Ok((first, last))
}

/// Lays the bookings of one month out into week rows and non-colliding lanes.
///
/// Weeks start on Monday. Segments are clipped to the in-month days of each
/// week, and bookings are placed in (start ascending, longer first) order so
/// that long bookings claim the low lanes. Bookings with `date_from > date_to`
/// are skipped.
pub fn layout_month<'a>(
    year: i32,
    month: u32,
    bookings: &'a [Booking],
    filter: &ResourceFilter,
) -> Result<MonthLayout<'a>, CalendarError> {
    let (first, last) = month_bounds(year, month)?;
    let invalid = || CalendarError::InvalidMonth { year, month };

    let mut ordered: Vec<&Booking> = Vec::with_capacity(bookings.len());
    for b in bookings {
        if !filter.accepts(b) {
            continue;
        }
        if !b.has_valid_range() {
            debug!(booking = %b.id, from = %b.date_from, to = %b.date_to, "skipping booking with inverted range");
            continue;
        }
        ordered.push(b);
    }
    // Stable: equal keys keep input order.
    ordered.sort_by(|a, b| {
        a.date_from
            .cmp(&b.date_from)
            .then_with(|| b.duration_days().cmp(&a.duration_days()))
    });

    let lead = u64::from(first.weekday().num_days_from_monday());
    let mut week_start = first.checked_sub_days(Days::new(lead)).ok_or_else(invalid)?;

    let mut weeks = Vec::new();
    while week_start <= last {
        let week_end = week_start.checked_add_days(Days::new(6)).ok_or_else(invalid)?;
        let visible_start = week_start.max(first);
        let visible_end = week_end.min(last);

        let days = week_start
            .iter_days()
            .take(7)
            .map(|date| DayCell {
                date,
                day: date.day(),
                in_month: date >= first && date <= last,
            })
            .collect();

        let mut lanes: Vec<Vec<(u8, u8)>> = Vec::new();
        let mut segments = Vec::new();
        for &b in &ordered {
            if b.date_to < visible_start || b.date_from > visible_end {
                continue;
            }
            let seg_start = b.date_from.max(visible_start);
            let seg_end = b.date_to.min(visible_end);
            let start_col = (seg_start - week_start).num_days() as u8;
            let end_col = (seg_end - week_start).num_days() as u8;

            let row = match lanes
                .iter()
                .position(|taken| taken.iter().all(|&(s, e)| end_col < s || start_col > e))
            {
                Some(row) => row,
                None => {
                    lanes.push(Vec::new());
                    lanes.len() - 1
                }
            };
            lanes[row].push((start_col, end_col));

            segments.push(Segment {
                booking: b,
                start_col,
                end_col,
                row,
                is_start: seg_start == b.date_from,
                is_end: seg_end == b.date_to,
            });
        }

        debug!(week = %week_start, segments = segments.len(), rows = lanes.len(), "laid out week");
        weeks.push(Week {
            start: week_start,
            days,
            segments,
            rows: lanes.len(),
        });

        week_start = match week_start.checked_add_days(Days::new(7)) {
            Some(d) => d,
            None => break,
        };
    }

    Ok(MonthLayout {
        year,
        month,
        weeks,
    })
}

const CELL: usize = 9;
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Plain-text rendering of a month layout. One line of day numbers per week
/// followed by one line per lane; bars open with `[` on the booking's real
/// first day and `<` when continued from the previous week.
pub fn render_text(layout: &MonthLayout<'_>, settings: &CalendarSettings) -> String {
    let mut out = String::new();
    if let Some(banner) = settings.banner_image.as_deref() {
        let _ = writeln!(out, "[banner: {banner}]");
    }
    let title = NaiveDate::from_ymd_opt(layout.year, layout.month, 1)
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_else(|| format!("{}-{:02}", layout.year, layout.month));
    let _ = writeln!(out, "{title}");

    for wd in WEEKDAYS {
        let _ = write!(out, "{wd:<CELL$}");
    }
    out.push('\n');

    let mut legend: Vec<&str> = Vec::new();
    for week in &layout.weeks {
        for cell in &week.days {
            if cell.in_month {
                let _ = write!(out, "{:<CELL$}", format!("{:>2}", cell.day));
            } else {
                let _ = write!(out, "{:<CELL$}", " .");
            }
        }
        out.push('\n');

        for row in 0..week.rows {
            let mut line = vec![' '; CELL * 7];
            for seg in week.segments.iter().filter(|s| s.row == row) {
                let from = seg.start_col as usize * CELL;
                let to = (seg.end_col as usize + 1) * CELL - 2;
                draw_bar(&mut line[from..=to], seg);
                let key = seg.booking.resource_key();
                if !legend.contains(&key) {
                    legend.push(key);
                }
            }
            let line: String = line.into_iter().collect();
            let _ = writeln!(out, "{}", line.trim_end());
        }
    }

    if !legend.is_empty() {
        legend.sort_unstable();
        out.push('\n');
        for key in legend {
            let _ = writeln!(out, "{key}\t{}", settings.color_for(key));
        }
    }
    out
}

fn draw_bar(cells: &mut [char], seg: &Segment<'_>) {
    let last = cells.len() - 1;
    cells.fill('=');
    cells[0] = if seg.is_start { '[' } else { '<' };
    cells[last] = if seg.is_end { ']' } else { '>' };

    let text = if seg.booking.label.is_empty() {
        seg.booking.resource_key()
    } else {
        seg.booking.label.as_str()
    };
    for (slot, ch) in cells[1..last].iter_mut().zip(text.chars()) {
        *slot = ch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BookingStatus;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn booking(from: NaiveDate, to: NaiveDate, resource: Option<&str>) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            date_from: from,
            date_to: to,
            resource: resource.map(str::to_string),
            status: BookingStatus::Booked,
            label: String::new(),
        }
    }

    #[test]
    fn may_2025_has_five_monday_weeks() {
        let layout = layout_month(2025, 5, &[], &ResourceFilter::All).unwrap();
        assert_eq!(layout.weeks.len(), 5);
        assert_eq!(layout.weeks[0].start, d(2025, 4, 28));
        assert!(!layout.weeks[0].days[2].in_month);
        assert!(layout.weeks[0].days[3].in_month);
        assert_eq!(layout.weeks[4].start, d(2025, 5, 26));
        assert!(!layout.weeks[4].days[6].in_month);
    }

    #[test]
    fn month_starting_monday_and_ending_sunday_needs_no_padding() {
        let layout = layout_month(2025, 9, &[], &ResourceFilter::All).unwrap();
        assert_eq!(layout.weeks[0].start, d(2025, 9, 1));
        let aug = layout_month(2025, 8, &[], &ResourceFilter::All).unwrap();
        let last = aug.weeks.last().unwrap();
        assert_eq!(last.days[6].date, d(2025, 8, 31));
        assert!(last.days.iter().all(|c| c.in_month));
    }

    #[test]
    fn booking_crossing_month_end_is_clipped_to_visible_days() {
        let bookings = vec![booking(d(2025, 5, 30), d(2025, 6, 2), Some("lagoon-42"))];
        let layout = layout_month(2025, 5, &bookings, &ResourceFilter::All).unwrap();

        let last = layout.weeks.last().unwrap();
        assert_eq!(last.segments.len(), 1);
        let seg = &last.segments[0];
        assert_eq!((seg.start_col, seg.end_col), (4, 5));
        assert_eq!(last.date_at(seg.start_col), d(2025, 5, 30));
        assert_eq!(last.date_at(seg.end_col), d(2025, 5, 31));
        assert!(seg.is_start);
        assert!(!seg.is_end);

        let total: usize = layout.weeks.iter().map(|w| w.segments.len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn booking_only_in_blank_cells_produces_no_segment() {
        let bookings = vec![booking(d(2025, 4, 28), d(2025, 4, 30), None)];
        let layout = layout_month(2025, 5, &bookings, &ResourceFilter::All).unwrap();
        assert!(layout.weeks.iter().all(|w| w.segments.is_empty()));
    }

    #[test]
    fn long_booking_claims_lane_before_short_one_on_same_day() {
        let short = booking(d(2025, 5, 5), d(2025, 5, 6), Some("a"));
        let long = booking(d(2025, 5, 5), d(2025, 5, 10), Some("b"));
        let after = booking(d(2025, 5, 8), d(2025, 5, 9), Some("c"));
        let bookings = vec![short.clone(), long.clone(), after.clone()];
        let layout = layout_month(2025, 5, &bookings, &ResourceFilter::All).unwrap();

        let week = &layout.weeks[1];
        let row_of = |id: Uuid| week.segments.iter().find(|s| s.booking.id == id).unwrap().row;
        assert_eq!(row_of(long.id), 0);
        assert_eq!(row_of(short.id), 1);
        // Short one ended on Tuesday, so lane 1 is free again on Thursday.
        assert_eq!(row_of(after.id), 1);
        assert_eq!(week.rows, 2);
    }

    #[test]
    fn identical_keys_keep_input_order() {
        let first = booking(d(2025, 5, 12), d(2025, 5, 14), Some("x"));
        let second = booking(d(2025, 5, 12), d(2025, 5, 14), Some("y"));
        let bookings = vec![first.clone(), second.clone()];
        let layout = layout_month(2025, 5, &bookings, &ResourceFilter::All).unwrap();
        let week = &layout.weeks[2];
        assert_eq!(week.segments[0].booking.id, first.id);
        assert_eq!(week.segments[0].row, 0);
        assert_eq!(week.segments[1].booking.id, second.id);
        assert_eq!(week.segments[1].row, 1);
    }

    #[test]
    fn resource_filter_and_inverted_ranges_are_dropped() {
        let bookings = vec![
            booking(d(2025, 5, 2), d(2025, 5, 3), Some("a")),
            booking(d(2025, 5, 2), d(2025, 5, 3), None),
            booking(d(2025, 5, 9), d(2025, 5, 2), Some("a")),
        ];
        let layout =
            layout_month(2025, 5, &bookings, &ResourceFilter::Resource("a".into())).unwrap();
        let segs: Vec<_> = layout.weeks.iter().flat_map(|w| &w.segments).collect();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].booking.id, bookings[0].id);

        let layout = layout_month(2025, 5, &bookings, &ResourceFilter::External).unwrap();
        let segs: Vec<_> = layout.weeks.iter().flat_map(|w| &w.segments).collect();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].booking.id, bookings[1].id);
    }

    #[test]
    fn invalid_month_is_rejected() {
        assert_eq!(
            layout_month(2025, 13, &[], &ResourceFilter::All).unwrap_err(),
            CalendarError::InvalidMonth {
                year: 2025,
                month: 13
            }
        );
        assert!(month_bounds(2025, 0).is_err());
    }

    // Deterministic pseudo-random bookings spread around February 2024.
    fn scattered_bookings(n: usize) -> Vec<Booking> {
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as i64
        };
        let base = d(2024, 1, 20);
        (0..n)
            .map(|i| {
                let from = base + chrono::Duration::days(next() % 45);
                let to = from + chrono::Duration::days(next() % 12);
                let resource = format!("boat-{}", i % 4);
                booking(from, to, Some(&resource))
            })
            .collect()
    }

    #[test]
    fn segments_sharing_a_row_never_overlap() {
        let bookings = scattered_bookings(60);
        let layout = layout_month(2024, 2, &bookings, &ResourceFilter::All).unwrap();
        for week in &layout.weeks {
            for (i, a) in week.segments.iter().enumerate() {
                assert!(a.row < week.rows);
                for b in &week.segments[i + 1..] {
                    if a.row == b.row {
                        assert!(!a.overlaps(b), "week {} row {} collides", week.start, a.row);
                    }
                }
            }
        }
    }

    #[test]
    fn segments_cover_each_booking_within_the_month() {
        let bookings = scattered_bookings(40);
        let (first, last) = month_bounds(2024, 2).unwrap();
        let layout = layout_month(2024, 2, &bookings, &ResourceFilter::All).unwrap();

        for b in &bookings {
            let mut covered = BTreeSet::new();
            for week in &layout.weeks {
                for seg in week.segments.iter().filter(|s| s.booking.id == b.id) {
                    for col in seg.start_col..=seg.end_col {
                        assert!(covered.insert(week.date_at(col)), "date covered twice");
                    }
                }
            }
            let expected: BTreeSet<NaiveDate> = b
                .date_from
                .iter_days()
                .take_while(|x| *x <= b.date_to)
                .filter(|x| *x >= first && *x <= last)
                .collect();
            assert_eq!(covered, expected);
        }
    }

    #[test]
    fn layout_is_deterministic() {
        let bookings = scattered_bookings(30);
        let a = layout_month(2024, 2, &bookings, &ResourceFilter::All).unwrap();
        let b = layout_month(2024, 2, &bookings, &ResourceFilter::All).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn text_render_marks_continuations_and_legend() {
        let mut b = booking(d(2025, 5, 30), d(2025, 6, 2), Some("lagoon-42"));
        b.label = "Smith".into();
        let bookings = vec![b];
        let layout = layout_month(2025, 5, &bookings, &ResourceFilter::All).unwrap();
        let mut settings = CalendarSettings::default();
        settings
            .resource_colors
            .insert("lagoon-42".into(), "teal".into());

        let text = render_text(&layout, &settings);
        assert!(text.starts_with("May 2025\n"));
        assert!(text.contains("[Smith"));
        assert!(text.trim_end().lines().any(|l| l.ends_with('>')));
        assert!(text.contains("lagoon-42\tteal"));
    }
}
