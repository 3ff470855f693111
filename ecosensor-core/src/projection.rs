//! Daily -> monthly/annual projections, CO2 and cost conversion
//!
//! All functions are total and purely linear; negative inputs propagate
//! through unchanged, matching the linear model.

use serde::Serialize;

/// Working days assumed per month.
pub const WORKING_DAYS_PER_MONTH: f64 = 22.0;

/// Working days assumed per year.
pub const WORKING_DAYS_PER_YEAR: f64 = 260.0;

/// EU-average grid carbon intensity in kg CO2 per kWh.
pub const DEFAULT_CO2_KG_PER_KWH: f64 = 0.276;

/// Placeholder EUR/kWh tariff.
pub const DEFAULT_PRICE_PER_KWH: f64 = 0.25;

pub fn daily_kwh(daily_energy_wh: f64) -> f64 {
    daily_energy_wh / 1000.0
}

pub fn monthly_kwh(daily_kwh: f64) -> f64 {
    daily_kwh * WORKING_DAYS_PER_MONTH
}

pub fn annual_kwh(daily_kwh: f64) -> f64 {
    daily_kwh * WORKING_DAYS_PER_YEAR
}

/// CO2 equivalent in kg for an energy amount; `factor` defaults to the
/// EU-average grid intensity when `None`.
pub fn co2_kg(energy_kwh: f64, factor: Option<f64>) -> f64 {
    energy_kwh * factor.unwrap_or(DEFAULT_CO2_KG_PER_KWH)
}

/// Estimated cost for an energy amount; `unit_price` defaults to the
/// placeholder EUR/kWh tariff when `None`.
pub fn cost_currency(energy_kwh: f64, unit_price: Option<f64>) -> f64 {
    energy_kwh * unit_price.unwrap_or(DEFAULT_PRICE_PER_KWH)
}

/// Plain-data report for operator-facing consumers (tray UI, dashboards).
#[derive(Debug, Clone, Serialize)]
pub struct EnergyReport {
    pub session_energy_wh: f64,
    pub daily_energy_wh: f64,
    pub last_power_watts: f64,
    pub daily_kwh: f64,
    pub estimated_monthly_kwh: f64,
    pub estimated_annual_kwh: f64,
    pub estimated_annual_co2_kg: f64,
    pub estimated_annual_cost: f64,
}

impl EnergyReport {
    pub fn from_state(state: &crate::energy::EnergyState) -> Self {
        let daily = daily_kwh(state.daily_energy_wh);
        let annual = annual_kwh(daily);
        Self {
            session_energy_wh: state.session_energy_wh,
            daily_energy_wh: state.daily_energy_wh,
            last_power_watts: state.last_power_watts,
            daily_kwh: daily,
            estimated_monthly_kwh: monthly_kwh(daily),
            estimated_annual_kwh: annual,
            estimated_annual_co2_kg: co2_kg(annual, None),
            estimated_annual_cost: cost_currency(annual, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wh_to_kwh_conversion() {
        assert_eq!(daily_kwh(1500.0), 1.5);
        assert_eq!(daily_kwh(0.0), 0.0);
    }

    #[test]
    fn monthly_is_22_working_days() {
        assert_eq!(monthly_kwh(1.0), 22.0);
        assert_eq!(monthly_kwh(0.5), 11.0);
        assert_eq!(monthly_kwh(0.0), 0.0);
    }

    #[test]
    fn annual_is_260_working_days() {
        assert_eq!(annual_kwh(1.0), 260.0);
        assert_eq!(annual_kwh(2.5), 650.0);
    }

    #[test]
    fn co2_default_is_eu_average() {
        assert_eq!(co2_kg(100.0, None), 27.6);
        assert_eq!(co2_kg(100.0, Some(0.5)), 50.0);
    }

    #[test]
    fn cost_default_is_quarter_euro() {
        assert_eq!(cost_currency(100.0, None), 25.0);
        assert_eq!(cost_currency(100.0, Some(0.4)), 40.0);
    }

    #[test]
    fn negative_inputs_propagate_linearly() {
        assert_eq!(monthly_kwh(-1.0), -22.0);
        assert_eq!(annual_kwh(-1.0), -260.0);
        assert_eq!(co2_kg(-100.0, None), -27.6);
        assert_eq!(cost_currency(-100.0, None), -25.0);
    }
}
