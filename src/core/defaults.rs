//! Ready-to-render example configurations, one per poster type.

use chrono::{Days, NaiveDate, Utc};

use crate::core::poster::{
    BarConfig, DEFAULT_TEMPLATE_NAME, DEFAULT_VALUE_AXIS_LABEL, DualConfig, Orientation,
    PieConfig, PosterCommon, PosterConfig, PosterType, SeriesType, TimeRange, YSeries,
};

const DEFAULT_COLORS: [&str; 5] = ["#1C5C3D", "#D97706", "#2563EB", "#6B7280", "#10B981"];
const VENUES: [&str; 5] = ["Jupiter", "Raydium", "Orca", "Meteora", "Other"];
const DUAL_DAYS: u64 = 30;

pub fn default_config(poster_type: PosterType) -> PosterConfig {
    match poster_type {
        PosterType::Pie => PosterConfig::Pie(default_pie()),
        PosterType::Bar => PosterConfig::Bar(default_bar()),
        PosterType::Dual => PosterConfig::Dual(default_dual(Utc::now().date_naive())),
    }
}

fn common(title: &str, subtitle: &str, note: &str) -> PosterCommon {
    PosterCommon {
        title: title.to_string(),
        subtitle: subtitle.to_string(),
        note_value: note.to_string(),
        template_name: DEFAULT_TEMPLATE_NAME.to_string(),
        date_str: None,
        center_image: None,
    }
}

fn venues() -> Vec<String> {
    VENUES.iter().map(|v| v.to_string()).collect()
}

fn colors(n: usize) -> Vec<String> {
    DEFAULT_COLORS.iter().take(n).map(|c| c.to_string()).collect()
}

pub fn default_pie() -> PieConfig {
    let labels = venues();
    PieConfig {
        common: common(
            "DEX Volume Share - Last 30 Days",
            "Share of total volume by venue",
            "Illustrative split only.",
        ),
        colors_hex: Some(colors(labels.len())),
        values: vec![40.0, 25.0, 20.0, 10.0, 5.0],
        labels,
    }
}

pub fn default_bar() -> BarConfig {
    let labels = venues();
    BarConfig {
        common: common(
            "DEX Volume - Last 30 Days",
            "Total volume per venue (USD)",
            "Example data only.",
        ),
        values: vec![
            1_200_000_000.0,
            850_000_000.0,
            650_000_000.0,
            250_000_000.0,
            100_000_000.0,
        ],
        colors_hex: Some(colors(labels.len())),
        orientation: Orientation::Horizontal,
        value_axis_label: DEFAULT_VALUE_AXIS_LABEL.to_string(),
        label_images: Some(vec![None; labels.len()]),
        labels,
    }
}

/// Thirty days of synthetic daily data ending at `today`.
pub fn default_dual(today: NaiveDate) -> DualConfig {
    let dates = (0..DUAL_DAYS)
        .rev()
        .map(|back| {
            today
                .checked_sub_days(Days::new(back))
                .unwrap_or(today)
                .format("%Y-%m-%d")
                .to_string()
        })
        .collect();

    let swappers_a = (0..DUAL_DAYS).map(|i| 100.0 + i as f64 * 5.0).collect();
    let swappers_b = (0..DUAL_DAYS).map(|i| 80.0 + i as f64 * 4.0).collect();
    let price = (0..DUAL_DAYS).map(|i| 2.0 + i as f64 * 0.02).collect();

    DualConfig {
        common: common(
            "Swappers & Token Price - Last 30 Days",
            "Left: daily unique swappers / Right: token price (USD)",
            "Synthetic data.",
        ),
        x_values: dates,
        y_series: YSeries(vec![
            ("DEX A swappers".to_string(), swappers_a),
            ("DEX B swappers".to_string(), swappers_b),
        ]),
        colors_hex: Some(colors(2)),
        ylabel_left: "Wallets (unique / day)".to_string(),
        log_left: false,
        include_zero_left: true,
        left_series_type: SeriesType::Line,
        right_series: Some(price),
        right_color_hex: "#2563EB".to_string(),
        ylabel_right: "Price (USD)".to_string(),
        right_series_type: SeriesType::Line,
        log_right: false,
        include_zero_right: false,
        highlight_regions: None,
        highlight_points: None,
        time_range: TimeRange::All,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pie_default_has_five_shares_summing_to_100() {
        let pie = default_pie();
        assert_eq!(pie.labels.len(), 5);
        assert_eq!(pie.values.len(), 5);
        assert_eq!(pie.colors_hex.as_ref().map(Vec::len), Some(5));
        assert_eq!(pie.values.iter().sum::<f64>(), 100.0);
    }

    #[test]
    fn bar_default_has_one_image_slot_per_label() {
        let bar = default_bar();
        assert_eq!(bar.label_images.as_ref().map(Vec::len), Some(bar.labels.len()));
        assert!(bar.label_images.unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn dual_default_ends_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let dual = default_dual(today);
        assert_eq!(dual.x_values.len(), 30);
        assert_eq!(dual.x_values.first().unwrap(), "2024-02-01");
        assert_eq!(dual.x_values.last().unwrap(), "2024-03-01");
        assert_eq!(dual.right_series.as_ref().map(Vec::len), Some(30));
        assert!(dual.y_series.iter().all(|(_, v)| v.len() == 30));
    }

    #[test]
    fn every_default_passes_validation() {
        for poster_type in PosterType::ALL {
            let cfg = default_config(poster_type);
            assert_eq!(cfg.poster_type(), poster_type);
            let reparsed = PosterConfig::from_value(&cfg.to_json()).unwrap();
            assert_eq!(reparsed, cfg);
        }
    }
}
