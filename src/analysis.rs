//! Descriptive business analytics over joined customer transactions

use crate::data::{require_column, AMOUNT, CUSTOMER_ID, CUSTOMER_NAME, PAYMENT_METHOD};
use polars::prelude::*;
use serde::Serialize;
use std::fmt;

const REVENUE: &str = "revenue";
const ORDERS: &str = "orders";

/// Revenue and order statistics of one customer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRevenue {
    pub customer_id: String,
    pub name: String,
    pub revenue: f64,
    pub orders: i64,
}

impl CustomerRevenue {
    /// Average order value
    pub fn average_order_value(&self) -> f64 {
        if self.orders == 0 {
            0.0
        } else {
            self.revenue / self.orders as f64
        }
    }
}

/// Revenue collected through one payment method
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRevenue {
    pub payment_method: String,
    pub revenue: f64,
}

/// Revenue per customer and per payment method
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessReport {
    /// Sorted by revenue, highest first
    pub customers: Vec<CustomerRevenue>,
    /// Sorted by revenue, highest first
    pub payment_methods: Vec<PaymentRevenue>,
}

fn as_string_column(df: &DataFrame, name: &str) -> crate::Result<Series> {
    Ok(df.column(name)?.cast(&DataType::String)?)
}

/// Summarize revenue over transactions of known customers
pub fn business_report(customers: &DataFrame, transactions: &DataFrame) -> crate::Result<BusinessReport> {
    require_column(customers, "customers", CUSTOMER_ID)?;
    require_column(customers, "customers", CUSTOMER_NAME)?;
    for column in [CUSTOMER_ID, AMOUNT, PAYMENT_METHOD] {
        require_column(transactions, "transactions", column)?;
    }

    let people = DataFrame::new(vec![
        as_string_column(customers, CUSTOMER_ID)?,
        as_string_column(customers, CUSTOMER_NAME)?,
    ])?;
    let sales = DataFrame::new(vec![
        as_string_column(transactions, CUSTOMER_ID)?,
        transactions.column(AMOUNT)?.cast(&DataType::Float64)?,
        as_string_column(transactions, PAYMENT_METHOD)?,
    ])?;

    let joined = sales
        .lazy()
        .join(
            people.lazy(),
            [col(CUSTOMER_ID)],
            [col(CUSTOMER_ID)],
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?;

    let per_customer = joined
        .clone()
        .lazy()
        .group_by([col(CUSTOMER_ID), col(CUSTOMER_NAME)])
        .agg([col(AMOUNT).sum().alias(REVENUE), len().alias(ORDERS)])
        .collect()?;
    let per_method = joined
        .lazy()
        .group_by([col(PAYMENT_METHOD)])
        .agg([col(AMOUNT).sum().alias(REVENUE)])
        .collect()?;

    let ids = per_customer.column(CUSTOMER_ID)?.str()?;
    let names = per_customer.column(CUSTOMER_NAME)?.str()?;
    let revenue = per_customer.column(REVENUE)?.f64()?;
    let orders = per_customer.column(ORDERS)?.cast(&DataType::Int64)?;
    let orders = orders.i64()?;

    let mut customers: Vec<CustomerRevenue> = ids
        .into_iter()
        .zip(names.into_iter())
        .zip(revenue.into_iter())
        .zip(orders.into_iter())
        .map(|(((id, name), revenue), orders)| CustomerRevenue {
            customer_id: id.unwrap_or_default().to_string(),
            name: name.unwrap_or_default().to_string(),
            revenue: revenue.unwrap_or_default(),
            orders: orders.unwrap_or_default(),
        })
        .collect();
    customers.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });

    let methods = per_method.column(PAYMENT_METHOD)?.str()?;
    let method_revenue = per_method.column(REVENUE)?.f64()?;
    let mut payment_methods: Vec<PaymentRevenue> = methods
        .into_iter()
        .zip(method_revenue.into_iter())
        .map(|(method, revenue)| PaymentRevenue {
            payment_method: method.unwrap_or("unknown").to_string(),
            revenue: revenue.unwrap_or_default(),
        })
        .collect();
    payment_methods.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.payment_method.cmp(&b.payment_method))
    });

    Ok(BusinessReport {
        customers,
        payment_methods,
    })
}

impl fmt::Display for BusinessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Revenue per customer:")?;
        writeln!(f, "  {:<12} {:<20} {:>10} {:>7} {:>10}", "customer", "name", "revenue", "orders", "avg order")?;
        for c in &self.customers {
            writeln!(
                f,
                "  {:<12} {:<20} {:>10.2} {:>7} {:>10.2}",
                c.customer_id,
                c.name,
                c.revenue,
                c.orders,
                c.average_order_value()
            )?;
        }
        writeln!(f, "\nRevenue by payment method:")?;
        for p in &self.payment_methods {
            writeln!(f, "  {:<20} {:>10.2}", p.payment_method, p.revenue)?;
        }
        Ok(())
    }
}
