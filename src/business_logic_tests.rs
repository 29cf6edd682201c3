#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::commands::batch::{
        avg_bale_weight_warning, batch_code_prefix, validate_batch_numbers,
    };
    use crate::commands::costing::validate_total_cost;
    use crate::commands::invoice::{derive_status, invoice_totals, InvoiceStatus, LineItemInput};
    use crate::commands::parse_date;
    use crate::commands::production::{check_material_balance, split_bags};
    use crate::error::MillError;

    #[test]
    fn test_bag_decomposition() {
        // 60 kg per bag, remainder carried loose
        assert_eq!(split_bags(dec!(125)), (2, dec!(5)));
        assert_eq!(split_bags(dec!(60)), (1, dec!(0)));
        assert_eq!(split_bags(dec!(59.5)), (0, dec!(59.5)));
        assert_eq!(split_bags(dec!(600)), (10, dec!(0)));
        assert_eq!(split_bags(dec!(0.5)), (0, dec!(0.5)));
    }

    #[test]
    fn test_material_balance_tolerance() {
        assert!(check_material_balance(dec!(1000), dec!(950), dec!(50)).is_ok());
        // Off by exactly the tolerance band is still accepted
        assert!(check_material_balance(dec!(1000), dec!(950), dec!(50.01)).is_ok());
        assert!(matches!(
            check_material_balance(dec!(1000), dec!(950), dec!(50.02)),
            Err(MillError::MaterialBalanceMismatch { .. })
        ));
        assert!(matches!(
            check_material_balance(dec!(1000), dec!(900), dec!(50)),
            Err(MillError::MaterialBalanceMismatch { .. })
        ));
    }

    #[test]
    fn test_efficiency_exceeded_is_the_specific_error() {
        // Output alone above input surfaces as EfficiencyExceeded, not the
        // generic mismatch
        assert!(matches!(
            check_material_balance(dec!(100), dec!(100.02), dec!(0)),
            Err(MillError::EfficiencyExceeded { .. })
        ));
        // Within tolerance it passes
        assert!(check_material_balance(dec!(100), dec!(100.01), dec!(0)).is_ok());
    }

    #[test]
    fn test_invoice_totals_gst() {
        // 500 kg x 20 = 10000 subtotal, 9% + 9% -> 11800 total
        let items = vec![LineItemInput {
            yarn_count: "Count 20".into(),
            bags: 8,
            weight_kg: dec!(500),
            rate: dec!(20),
        }];
        let totals = invoice_totals(&items);
        assert_eq!(totals.subtotal, dec!(10000.00));
        assert_eq!(totals.cgst, dec!(900.00));
        assert_eq!(totals.sgst, dec!(900.00));
        assert_eq!(totals.total, dec!(11800.00));
    }

    #[test]
    fn test_invoice_totals_rounding() {
        let items = vec![LineItemInput {
            yarn_count: "Count 30".into(),
            bags: 0,
            weight_kg: dec!(33.33),
            rate: dec!(3),
        }];
        let totals = invoice_totals(&items);
        assert_eq!(totals.subtotal, dec!(99.99));
        assert_eq!(totals.cgst, dec!(9.00)); // 8.9991 rounded
        assert_eq!(totals.total, dec!(117.99));
    }

    #[test]
    fn test_status_derivation_ladder() {
        let total = dec!(11800);
        assert_eq!(derive_status(dec!(0), total), InvoiceStatus::Unpaid);
        assert_eq!(derive_status(dec!(5000), total), InvoiceStatus::Partial);
        assert_eq!(derive_status(dec!(11800), total), InvoiceStatus::Paid);
        // Within tolerance of the total counts as paid
        assert_eq!(derive_status(dec!(11799.99), total), InvoiceStatus::Paid);
        assert_eq!(derive_status(dec!(11799.98), total), InvoiceStatus::Partial);
        // Removing payments walks the status back, never below UNPAID
        assert_eq!(derive_status(dec!(0), total), InvoiceStatus::Unpaid);
    }

    #[test]
    fn test_batch_number_validation() {
        assert!(validate_batch_numbers(1, dec!(0.01)).is_ok());
        assert!(validate_batch_numbers(9999, dec!(999999)).is_ok());
        assert!(matches!(
            validate_batch_numbers(0, dec!(100)),
            Err(MillError::InvalidQuantity(_))
        ));
        assert!(matches!(
            validate_batch_numbers(10000, dec!(100)),
            Err(MillError::InvalidQuantity(_))
        ));
        assert!(matches!(
            validate_batch_numbers(10, dec!(0)),
            Err(MillError::InvalidQuantity(_))
        ));
        assert!(matches!(
            validate_batch_numbers(10, dec!(1000000)),
            Err(MillError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_avg_bale_weight_advisory() {
        // 170 kg / bale is in the plausible band
        assert!(avg_bale_weight_warning(10, dec!(1700)).is_none());
        // 5 kg / bale is suspicious but non-blocking
        assert!(avg_bale_weight_warning(10, dec!(50)).is_some());
        // 600 kg / bale likewise
        assert!(avg_bale_weight_warning(10, dec!(6000)).is_some());
        // Exactly on the bounds: no warning
        assert!(avg_bale_weight_warning(10, dec!(100)).is_none());
        assert!(avg_bale_weight_warning(10, dec!(5000)).is_none());
    }

    #[test]
    fn test_batch_code_prefix() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert_eq!(batch_code_prefix(date), "202608");
    }

    #[test]
    fn test_cost_ceiling() {
        assert!(validate_total_cost(dec!(0.01)).is_ok());
        assert!(validate_total_cost(dec!(10000000)).is_ok());
        assert!(matches!(
            validate_total_cost(Decimal::ZERO),
            Err(MillError::InvalidQuantity(_))
        ));
        assert!(matches!(
            validate_total_cost(dec!(-5)),
            Err(MillError::InvalidQuantity(_))
        ));
        assert!(matches!(
            validate_total_cost(dec!(10000000.01)),
            Err(MillError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_date_parsing() {
        use chrono::NaiveDate;

        assert_eq!(
            parse_date("2026-08-29").unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()
        );
        assert_eq!(
            parse_date(" 2026-08-29 ").unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()
        );
        assert!(parse_date("29/08/2026").is_err());
        assert!(parse_date("").is_err());
    }
}
