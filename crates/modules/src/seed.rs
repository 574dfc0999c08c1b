use crate::models::ModuleDescriptor;

/// The product's built-in module set, used to seed a fresh catalog.
///
/// Dependencies are declared direct-only; nothing here forms a cycle and
/// seeding rejects self-loops.
pub fn default_catalog() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new("attendance", "Attendance")
            .with_description("Daily attendance tracking for students and staff")
            .with_icon("calendar-check")
            .with_order(10),
        ModuleDescriptor::new("library", "Library")
            .with_description("Book catalog, lending and returns")
            .with_icon("book")
            .with_order(20),
        ModuleDescriptor::new("fee_management", "Fee Management")
            .with_description("Fee structures, invoices and payment tracking")
            .with_icon("credit-card")
            .with_order(30),
        ModuleDescriptor::new("online_learning", "Online Learning")
            .with_description("Course materials, assignments and submissions")
            .with_icon("laptop")
            .with_order(40),
        ModuleDescriptor::new("advanced_reporting", "Advanced Reporting")
            .with_description("Cross-module analytics and scheduled exports")
            .with_icon("chart-bar")
            .with_order(50)
            .with_dependencies(vec!["online_learning".to_string()]),
        ModuleDescriptor::new("transport", "Transport")
            .with_description("Bus routes, stops and rider assignments")
            .with_icon("bus")
            .with_order(60),
        ModuleDescriptor::new("hostel", "Hostel")
            .with_description("Dormitory rooms and boarder management")
            .with_icon("building")
            .with_order(70),
        ModuleDescriptor::new("hr", "Human Resources")
            .with_description("Employee records, roles and leave")
            .with_icon("users")
            .with_order(80),
        ModuleDescriptor::new("payroll", "Payroll")
            .with_description("Salary runs and payslips for employees")
            .with_icon("banknotes")
            .with_order(90)
            .with_dependencies(vec!["hr".to_string()]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_catalog_is_internally_consistent() {
        let catalog = default_catalog();
        let keys: HashSet<&str> = catalog.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys.len(), catalog.len(), "duplicate module keys");

        for descriptor in &catalog {
            assert!(!descriptor.depends_on(&descriptor.key));
            for dep in &descriptor.dependencies {
                assert!(keys.contains(dep.as_str()), "unknown dependency '{}'", dep);
            }
        }
    }

    #[test]
    fn default_catalog_orders_are_unique() {
        let catalog = default_catalog();
        let orders: HashSet<i32> = catalog.iter().map(|d| d.order).collect();
        assert_eq!(orders.len(), catalog.len());
    }
}
