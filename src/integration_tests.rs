#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::audit::LogAuditSink;
    use crate::commands::batch::{
        create_batch, create_batch_with_suffixes, delete_batch, remaining_balance, update_batch,
        CreateBatchInput, UpdateBatchInput,
    };
    use crate::commands::costing::{record_packaging, PackagingInput};
    use crate::commands::invoice::{
        create_invoice, delete_invoice, delete_payment, record_payment, CreateInvoiceInput,
        LineItemInput, PaymentMethod, RecordPaymentInput,
    };
    use crate::commands::outward::{delete_outward, record_outward, RecordOutwardInput};
    use crate::commands::production::{
        delete_production, record_production, ConsumptionInput, OutputInput,
        RecordProductionInput, WasteInput,
    };
    use crate::db::{self, CostingEntry, DbPool};
    use crate::error::MillError;

    const AUDIT: LogAuditSink = LogAuditSink;

    async fn setup_test_db() -> DbPool {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = db::init_pool(&database_url)
            .await
            .expect("Failed to create pool");
        db::init_database(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    async fn make_batch(pool: &DbPool, date: &str, weight: Decimal) -> i32 {
        let created = create_batch(
            pool,
            &AUDIT,
            None,
            CreateBatchInput {
                date: date.to_string(),
                supplier: "Integration Test Ginner".to_string(),
                bale_count: 6,
                weight_kg: weight,
            },
        )
        .await
        .expect("Failed to create batch");
        created.batch.batch_id
    }

    async fn cleanup_batch(pool: &DbPool, batch_id: i32) {
        let _ = sqlx::query("DELETE FROM batches WHERE batch_id = $1")
            .bind(batch_id)
            .execute(pool)
            .await;
    }

    #[tokio::test]
    async fn test_batch_over_consumption_integration() {
        let pool = setup_test_db().await;
        let batch_id = make_batch(&pool, "1998-01-05", dec!(1000)).await;

        // Drain the whole batch: 950 kg of yarn plus 50 kg of waste.
        let detail = record_production(
            &pool,
            &AUDIT,
            None,
            RecordProductionInput {
                date: "1998-01-06".to_string(),
                consumptions: vec![ConsumptionInput {
                    batch_id,
                    weight_kg: dec!(1000),
                }],
                outputs: vec![
                    OutputInput {
                        yarn_count: "Count 20".to_string(),
                        weight_kg: dec!(600),
                    },
                    OutputInput {
                        yarn_count: "Count 30".to_string(),
                        weight_kg: dec!(350),
                    },
                ],
                waste: WasteInput {
                    blow_room: dec!(20),
                    carding: dec!(15),
                    oe: dec!(10),
                    others: dec!(5),
                },
            },
        )
        .await
        .expect("Failed to record production");

        let remaining = remaining_balance(&pool, batch_id)
            .await
            .expect("Failed to read balance");
        assert_eq!(remaining, Decimal::ZERO);

        // One more kilogram must be refused, even a balanced one.
        let over = record_production(
            &pool,
            &AUDIT,
            None,
            RecordProductionInput {
                date: "1998-01-07".to_string(),
                consumptions: vec![ConsumptionInput {
                    batch_id,
                    weight_kg: dec!(1),
                }],
                outputs: vec![OutputInput {
                    yarn_count: "Count 20".to_string(),
                    weight_kg: dec!(0.99),
                }],
                waste: WasteInput {
                    oe: dec!(0.01),
                    ..Default::default()
                },
            },
        )
        .await;

        assert!(matches!(
            over,
            Err(MillError::InsufficientBatchBalance { .. })
        ));

        delete_production(&pool, &AUDIT, None, detail.entry.production_id)
            .await
            .expect("Failed to delete production");
        cleanup_batch(&pool, batch_id).await;
    }

    #[tokio::test]
    async fn test_production_delete_restores_balance() {
        let pool = setup_test_db().await;
        let batch_id = make_batch(&pool, "1998-02-02", dec!(500)).await;

        let input = RecordProductionInput {
            date: "1998-02-03".to_string(),
            consumptions: vec![ConsumptionInput {
                batch_id,
                weight_kg: dec!(200),
            }],
            outputs: vec![OutputInput {
                yarn_count: "Count 40".to_string(),
                weight_kg: dec!(190),
            }],
            waste: WasteInput {
                blow_room: dec!(10),
                ..Default::default()
            },
        };

        let detail = record_production(&pool, &AUDIT, None, input.clone())
            .await
            .expect("Failed to record production");
        assert_eq!(
            remaining_balance(&pool, batch_id).await.unwrap(),
            dec!(300)
        );

        delete_production(&pool, &AUDIT, None, detail.entry.production_id)
            .await
            .expect("Failed to delete production");
        assert_eq!(
            remaining_balance(&pool, batch_id).await.unwrap(),
            dec!(500)
        );

        // The same entry goes back in cleanly once the balance is restored.
        let detail = record_production(&pool, &AUDIT, None, input)
            .await
            .expect("Failed to re-record production");
        assert_eq!(
            remaining_balance(&pool, batch_id).await.unwrap(),
            dec!(300)
        );

        delete_production(&pool, &AUDIT, None, detail.entry.production_id)
            .await
            .expect("Failed to delete production");
        cleanup_batch(&pool, batch_id).await;
    }

    #[tokio::test]
    async fn test_batch_code_collisions_exhaust() {
        let pool = setup_test_db().await;
        let batch_id = make_batch(&pool, "1998-09-01", dec!(100)).await;

        let taken_suffix: String =
            sqlx::query_scalar("SELECT RIGHT(batch_code, 3) FROM batches WHERE batch_id = $1")
                .bind(batch_id)
                .fetch_one(&pool)
                .await
                .unwrap();

        // Every attempt lands on the suffix already in use.
        let result = create_batch_with_suffixes(
            &pool,
            &AUDIT,
            None,
            CreateBatchInput {
                date: "1998-09-02".to_string(),
                supplier: "Integration Test Ginner".to_string(),
                bale_count: 6,
                weight_kg: dec!(100),
            },
            || taken_suffix.clone(),
        )
        .await;
        assert!(matches!(result, Err(MillError::CodeExhausted)));

        cleanup_batch(&pool, batch_id).await;
    }

    #[tokio::test]
    async fn test_batch_date_locked_to_code_month() {
        let pool = setup_test_db().await;
        let batch_id = make_batch(&pool, "1998-07-01", dec!(100)).await;

        let moved = update_batch(
            &pool,
            &AUDIT,
            None,
            UpdateBatchInput {
                batch_id,
                date: "1998-08-01".to_string(),
                supplier: "Integration Test Ginner".to_string(),
                bale_count: 6,
                weight_kg: dec!(100),
            },
        )
        .await;
        assert!(matches!(moved, Err(MillError::Validation(_))));

        // Moving within the coded month is fine.
        let updated = update_batch(
            &pool,
            &AUDIT,
            None,
            UpdateBatchInput {
                batch_id,
                date: "1998-07-15".to_string(),
                supplier: "Integration Test Ginner".to_string(),
                bale_count: 6,
                weight_kg: dec!(100),
            },
        )
        .await
        .expect("Failed to update batch within month");
        assert_eq!(
            updated.received_date,
            chrono::NaiveDate::from_ymd_opt(1998, 7, 15).unwrap()
        );

        cleanup_batch(&pool, batch_id).await;
    }

    #[tokio::test]
    async fn test_outward_cannot_exceed_stock() {
        let pool = setup_test_db().await;
        let batch_id = make_batch(&pool, "1998-10-01", dec!(300)).await;
        let yarn_count = format!("Count 20 Lot {}", chrono::Utc::now().timestamp_micros());

        let detail = record_production(
            &pool,
            &AUDIT,
            None,
            RecordProductionInput {
                date: "1998-10-02".to_string(),
                consumptions: vec![ConsumptionInput {
                    batch_id,
                    weight_kg: dec!(105),
                }],
                outputs: vec![OutputInput {
                    yarn_count: yarn_count.clone(),
                    weight_kg: dec!(100),
                }],
                waste: WasteInput {
                    others: dec!(5),
                    ..Default::default()
                },
            },
        )
        .await
        .expect("Failed to record production");

        let dispatched = record_outward(
            &pool,
            &AUDIT,
            None,
            RecordOutwardInput {
                date: "1998-10-03".to_string(),
                yarn_count: yarn_count.clone(),
                weight_kg: dec!(60),
                destination: Some("Integration Test Weaver".to_string()),
                notes: None,
            },
        )
        .await
        .expect("Failed to record outward");

        // 40 kg remain for this count; a 50 kg dispatch must be refused.
        let over = record_outward(
            &pool,
            &AUDIT,
            None,
            RecordOutwardInput {
                date: "1998-10-04".to_string(),
                yarn_count: yarn_count.clone(),
                weight_kg: dec!(50),
                destination: None,
                notes: None,
            },
        )
        .await;
        assert!(matches!(over, Err(MillError::InvalidQuantity(_))));

        delete_outward(&pool, &AUDIT, None, dispatched.outward_id)
            .await
            .expect("Failed to delete outward");
        delete_production(&pool, &AUDIT, None, detail.entry.production_id)
            .await
            .expect("Failed to delete production");
        cleanup_batch(&pool, batch_id).await;
    }

    #[tokio::test]
    async fn test_batch_delete_guard() {
        let pool = setup_test_db().await;
        let batch_id = make_batch(&pool, "1998-03-02", dec!(400)).await;

        let detail = record_production(
            &pool,
            &AUDIT,
            None,
            RecordProductionInput {
                date: "1998-03-03".to_string(),
                consumptions: vec![ConsumptionInput {
                    batch_id,
                    weight_kg: dec!(100),
                }],
                outputs: vec![OutputInput {
                    yarn_count: "Count 20".to_string(),
                    weight_kg: dec!(95),
                }],
                waste: WasteInput {
                    carding: dec!(5),
                    ..Default::default()
                },
            },
        )
        .await
        .expect("Failed to record production");

        let blocked = delete_batch(&pool, &AUDIT, None, batch_id).await;
        assert!(matches!(blocked, Err(MillError::BatchInUse)));

        delete_production(&pool, &AUDIT, None, detail.entry.production_id)
            .await
            .expect("Failed to delete production");
        delete_batch(&pool, &AUDIT, None, batch_id)
            .await
            .expect("Failed to delete drained batch");
    }

    #[tokio::test]
    async fn test_invoice_payment_ladder() {
        let pool = setup_test_db().await;
        let invoice_no = format!("IT-{}", chrono::Utc::now().timestamp_micros());

        let detail = create_invoice(
            &pool,
            &AUDIT,
            None,
            CreateInvoiceInput {
                invoice_no: invoice_no.clone(),
                date: "1998-04-01".to_string(),
                customer: "Integration Test Weaver".to_string(),
                line_items: vec![LineItemInput {
                    yarn_count: "Count 20".to_string(),
                    bags: 8,
                    weight_kg: dec!(500),
                    rate: dec!(20),
                }],
            },
        )
        .await
        .expect("Failed to create invoice");

        let invoice_id = detail.invoice.invoice_id;
        assert_eq!(detail.invoice.total, dec!(11800.00));
        assert_eq!(detail.invoice.status, "UNPAID");

        let first = record_payment(
            &pool,
            &AUDIT,
            None,
            RecordPaymentInput {
                invoice_id,
                date: "1998-04-05".to_string(),
                amount: dec!(5000),
                method: PaymentMethod::Bank,
                reference: Some("NEFT-001".to_string()),
                notes: None,
            },
        )
        .await
        .expect("Failed to record first payment");

        let status: String =
            sqlx::query_scalar("SELECT status FROM invoices WHERE invoice_id = $1")
                .bind(invoice_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "PARTIAL");

        let second = record_payment(
            &pool,
            &AUDIT,
            None,
            RecordPaymentInput {
                invoice_id,
                date: "1998-04-20".to_string(),
                amount: dec!(6800),
                method: PaymentMethod::Upi,
                reference: None,
                notes: None,
            },
        )
        .await
        .expect("Failed to record second payment");

        let status: String =
            sqlx::query_scalar("SELECT status FROM invoices WHERE invoice_id = $1")
                .bind(invoice_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "PAID");

        // Settled invoices take no further money.
        let over = record_payment(
            &pool,
            &AUDIT,
            None,
            RecordPaymentInput {
                invoice_id,
                date: "1998-04-21".to_string(),
                amount: dec!(1),
                method: PaymentMethod::Cash,
                reference: None,
                notes: None,
            },
        )
        .await;
        assert!(matches!(over, Err(MillError::PaymentExceedsBalance { .. })));

        // Removing the closing payment reopens the invoice.
        delete_payment(&pool, &AUDIT, None, second.payment_id)
            .await
            .expect("Failed to delete payment");
        let status: String =
            sqlx::query_scalar("SELECT status FROM invoices WHERE invoice_id = $1")
                .bind(invoice_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "PARTIAL");

        // An invoice with payments on record cannot be deleted.
        let blocked = delete_invoice(&pool, &AUDIT, None, invoice_id).await;
        assert!(matches!(blocked, Err(MillError::InvoiceHasPayments)));

        delete_payment(&pool, &AUDIT, None, first.payment_id)
            .await
            .expect("Failed to delete payment");
        delete_invoice(&pool, &AUDIT, None, invoice_id)
            .await
            .expect("Failed to delete invoice");
    }

    #[tokio::test]
    async fn test_duplicate_invoice_number() {
        let pool = setup_test_db().await;
        let invoice_no = format!("IT-DUP-{}", chrono::Utc::now().timestamp_micros());

        let input = || CreateInvoiceInput {
            invoice_no: invoice_no.clone(),
            date: "1998-05-01".to_string(),
            customer: "Integration Test Weaver".to_string(),
            line_items: vec![LineItemInput {
                yarn_count: "Count 30".to_string(),
                bags: 1,
                weight_kg: dec!(60),
                rate: dec!(25),
            }],
        };

        let detail = create_invoice(&pool, &AUDIT, None, input())
            .await
            .expect("Failed to create invoice");

        let dup = create_invoice(&pool, &AUDIT, None, input()).await;
        assert!(matches!(dup, Err(MillError::DuplicateInvoiceNumber(_))));

        delete_invoice(&pool, &AUDIT, None, detail.invoice.invoice_id)
            .await
            .expect("Failed to delete invoice");
    }

    #[tokio::test]
    async fn test_packaging_requires_production() {
        let pool = setup_test_db().await;

        // No production has ever run on this date.
        let result = record_packaging(
            &pool,
            &AUDIT,
            None,
            PackagingInput {
                date: "1997-12-25".to_string(),
                rate_per_kg: dec!(1.6),
            },
        )
        .await;

        assert!(matches!(result, Err(MillError::NoProductionForDate(_))));
    }

    #[tokio::test]
    async fn test_packaging_snapshot_survives_production_delete() {
        let pool = setup_test_db().await;
        let batch_id = make_batch(&pool, "1998-06-01", dec!(300)).await;

        let detail = record_production(
            &pool,
            &AUDIT,
            None,
            RecordProductionInput {
                date: "1998-06-02".to_string(),
                consumptions: vec![ConsumptionInput {
                    batch_id,
                    weight_kg: dec!(105),
                }],
                outputs: vec![OutputInput {
                    yarn_count: "Count 20".to_string(),
                    weight_kg: dec!(100),
                }],
                waste: WasteInput {
                    others: dec!(5),
                    ..Default::default()
                },
            },
        )
        .await
        .expect("Failed to record production");

        let entry = record_packaging(
            &pool,
            &AUDIT,
            None,
            PackagingInput {
                date: "1998-06-02".to_string(),
                rate_per_kg: dec!(1.6),
            },
        )
        .await
        .expect("Failed to record packaging cost");

        assert_eq!(entry.total_cost, dec!(160.00));
        assert_eq!(entry.basis_output_kg, Some(dec!(100)));
        assert!(!entry.basis_stale);

        // Deleting the production leaves the snapshot intact but flags it.
        delete_production(&pool, &AUDIT, None, detail.entry.production_id)
            .await
            .expect("Failed to delete production");

        let after: CostingEntry =
            sqlx::query_as("SELECT * FROM costing_entries WHERE costing_id = $1")
                .bind(entry.costing_id)
                .fetch_one(&pool)
                .await
                .expect("Failed to re-fetch costing entry");
        assert_eq!(after.total_cost, dec!(160.00));
        assert!(after.basis_stale);

        let _ = sqlx::query("DELETE FROM costing_entries WHERE costing_id = $1")
            .bind(entry.costing_id)
            .execute(&pool)
            .await;
        cleanup_batch(&pool, batch_id).await;
    }
}
