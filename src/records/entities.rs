//! Clinic record types.
//!
//! Dates and times are kept as the strings the client sends; money is `f64`;
//! free-form structures (symptoms, invoice items, result values) are raw JSON.

use serde_json::Value;

define_entity! {
    /// People registered with a clinic
    pub struct Patient / PatientChanges {
        table: "patients",
        path: "/api/patients",
        label: "Patient",
        required: ["first_name", "last_name"],
        writers: [],
        deleters: [Admin, Doctor],
        defaults: {},
        fields: {
            first_name: String,
            last_name: String,
            date_of_birth: String,
            gender: String,
            phone: String,
            email: String,
            address: String,
            blood_type: String,
            allergies: String,
            emergency_contact_name: String,
            emergency_contact_phone: String,
        },
    }
}

define_entity! {
    pub struct Doctor / DoctorChanges {
        table: "doctors",
        path: "/api/doctors",
        label: "Doctor",
        required: ["first_name", "last_name", "specialization"],
        writers: [Admin],
        deleters: [Admin],
        defaults: { "status": "active", "experience_years": 0, "consultation_fee": 0 },
        fields: {
            first_name: String,
            last_name: String,
            email: String,
            phone: String,
            specialization: String,
            department: String,
            license_number: String,
            qualification: String,
            experience_years: i64,
            status: String,
            consultation_fee: f64,
            available_days: Vec<String>,
            available_hours: String,
        },
    }
}

define_entity! {
    pub struct Appointment / AppointmentChanges {
        table: "appointments",
        path: "/api/appointments",
        label: "Appointment",
        required: ["patient_id", "doctor_id", "date"],
        writers: [],
        deleters: [Admin, Doctor, Receptionist],
        defaults: { "type": "consultation", "status": "scheduled" },
        fields: {
            patient_id: String,
            patient_name: String,
            doctor_id: String,
            doctor_name: String,
            date: String,
            time: String,
            kind = "type": String,
            reason: String,
            notes: String,
            status: String,
        },
    }
}

define_entity! {
    pub struct TriageRecord / TriageRecordChanges {
        table: "triage_records",
        path: "/api/triage-records",
        label: "Triage record",
        required: ["patient_id", "chief_complaint", "severity_level"],
        writers: [Admin, Doctor, Nurse],
        deleters: [Admin],
        defaults: { "status": "pending" },
        fields: {
            patient_id: String,
            patient_name: String,
            triage_nurse_id: String,
            triage_nurse_name: String,
            arrival_time: String,
            chief_complaint: String,
            severity_level: String,
            priority_score: i64,
            symptoms: Value,
            allergies: String,
            current_medications: String,
            pain_level: i64,
            consciousness_level: String,
            triage_notes: String,
            status: String,
        },
    }
}

define_entity! {
    /// Observations taken at the bedside, separate from the triage assessment
    pub struct VitalSign / VitalSignChanges {
        table: "vital_signs",
        path: "/api/vital-signs",
        label: "Vital signs record",
        required: ["patient_id"],
        writers: [Admin, Doctor, Nurse],
        deleters: [Admin],
        defaults: {},
        fields: {
            patient_id: String,
            patient_name: String,
            recorded_by: String,
            recorded_at: String,
            temperature: f64,
            blood_pressure: String,
            heart_rate: i64,
            respiratory_rate: i64,
            oxygen_saturation: f64,
            weight: f64,
            height: f64,
            notes: String,
        },
    }
}

define_entity! {
    pub struct ImagingStudy / ImagingStudyChanges {
        table: "imaging_studies",
        path: "/api/imaging",
        label: "Imaging study",
        required: ["patient_id", "study_type"],
        writers: [Admin, Doctor, LabTechnician],
        deleters: [Admin],
        defaults: { "priority": "routine", "status": "scheduled" },
        fields: {
            patient_id: String,
            patient_name: String,
            study_type: String,
            modality: String,
            body_part: String,
            indication: String,
            ordering_doctor: String,
            radiologist: String,
            study_date: String,
            priority: String,
            status: String,
            report: String,
            findings: String,
            impression: String,
        },
    }
}

define_entity! {
    pub struct AntenatalVisit / AntenatalVisitChanges {
        table: "antenatal_visits",
        path: "/api/antenatal",
        label: "Antenatal visit",
        required: ["patient_id"],
        writers: [Admin, Doctor, Nurse],
        deleters: [Admin],
        defaults: { "visit_number": 1, "status": "scheduled" },
        fields: {
            patient_id: String,
            patient_name: String,
            visit_number: i64,
            gestational_age: f64,
            lmp_date: String,
            edd_date: String,
            fundal_height: f64,
            fetal_heart_rate: f64,
            blood_pressure: String,
            weight: f64,
            urine_test: String,
            hemoglobin: f64,
            complaints: String,
            examination_findings: String,
            advice: String,
            next_visit_date: String,
            risk_factors: String,
            status: String,
        },
    }
}

define_entity! {
    pub struct Surgery / SurgeryChanges {
        table: "surgeries",
        path: "/api/surgeries",
        label: "Surgery",
        required: ["patient_id", "surgery_type"],
        writers: [Admin, Doctor],
        deleters: [Admin],
        defaults: { "status": "scheduled", "priority": "elective" },
        fields: {
            patient_id: String,
            patient_name: String,
            surgery_type: String,
            procedure_name: String,
            surgeon_name: String,
            anesthesiologist: String,
            scheduled_date: String,
            duration_minutes: i64,
            surgery_notes: String,
            pre_op_diagnosis: String,
            post_op_diagnosis: String,
            complications: String,
            blood_loss: f64,
            status: String,
            priority: String,
            operating_room: String,
        },
    }
}

define_entity! {
    pub struct Vaccination / VaccinationChanges {
        table: "vaccinations",
        path: "/api/vaccinations",
        label: "Vaccination",
        required: ["patient_id", "vaccine_name"],
        writers: [Admin, Doctor, Nurse],
        deleters: [Admin],
        defaults: { "dose_number": 1, "status": "completed" },
        fields: {
            patient_id: String,
            patient_name: String,
            vaccine_name: String,
            vaccine_type: String,
            dose_number: i64,
            batch_number: String,
            manufacturer: String,
            site: String,
            route: String,
            administered_by: String,
            administered_date: String,
            next_dose_date: String,
            adverse_reactions: String,
            status: String,
        },
    }
}

define_entity! {
    pub struct LabTest / LabTestChanges {
        table: "lab_tests",
        path: "/api/lab-tests",
        label: "Lab test",
        required: ["patient_id", "test_name"],
        writers: [Admin, Doctor, Nurse, LabTechnician],
        deleters: [Admin],
        defaults: { "status": "pending" },
        fields: {
            patient_id: String,
            patient_name: String,
            test_name: String,
            test_type: String,
            test_category: String,
            sample_type: String,
            sample_collected_date: String,
            ordered_by: String,
            ordered_date: String,
            status: String,
            notes: String,
            technician_name: String,
            result_values: Value,
            reference_range: String,
            interpretation: String,
        },
    }
}

define_entity! {
    pub struct Prescription / PrescriptionChanges {
        table: "prescriptions",
        path: "/api/prescriptions",
        label: "Prescription",
        required: ["patient_id", "medication_name"],
        writers: [Admin, Doctor],
        deleters: [Admin, Doctor],
        defaults: { "status": "active", "refills": 0 },
        fields: {
            patient_id: String,
            patient_name: String,
            doctor_id: String,
            doctor_name: String,
            medication_name: String,
            dosage: String,
            frequency: String,
            duration: String,
            quantity: i64,
            instructions: String,
            refills: i64,
            prescribed_date: String,
            status: String,
        },
    }
}

define_entity! {
    /// Pharmacy stock items
    pub struct InventoryItem / InventoryItemChanges {
        table: "inventory",
        path: "/api/inventory",
        label: "Inventory item",
        required: ["name"],
        writers: [Admin, Pharmacist],
        deleters: [Admin],
        defaults: {
            "current_stock": 0,
            "min_stock_level": 10,
            "unit": "units",
            "unit_price": 0,
            "status": "available",
        },
        fields: {
            name: String,
            sku: String,
            category: String,
            kind = "type": String,
            current_stock: i64,
            min_stock_level: i64,
            max_stock_level: i64,
            unit: String,
            unit_price: f64,
            supplier: String,
            location: String,
            expiry_date: String,
            batch_number: String,
            status: String,
            description: String,
        },
    }
}

define_entity! {
    pub struct DispensingRecord / DispensingRecordChanges {
        table: "dispensing_records",
        path: "/api/dispensing",
        label: "Dispensing record",
        required: ["medication_id", "quantity"],
        writers: [Admin, Pharmacist],
        deleters: [Admin],
        defaults: { "unit_price": 0, "total_amount": 0 },
        fields: {
            medication_id: String,
            medication_name: String,
            quantity: i64,
            dispensed_date: String,
            dispensed_by: String,
            dispensed_by_name: String,
            patient_name: String,
            sku: String,
            unit_price: f64,
            total_amount: f64,
            prescription_id: String,
            notes: String,
        },
    }
}

define_entity! {
    pub struct Payment / PaymentChanges {
        table: "payments",
        path: "/api/payments",
        label: "Payment",
        required: ["patient_id", "amount"],
        writers: [Admin, Receptionist],
        deleters: [Admin],
        defaults: { "currency": "UGX", "status": "completed" },
        fields: {
            patient_id: String,
            patient_name: String,
            amount: f64,
            currency: String,
            payment_method: String,
            payment_date: String,
            description: String,
            invoice_id: String,
            status: String,
            reference_number: String,
        },
    }
}

define_entity! {
    pub struct Invoice / InvoiceChanges {
        table: "invoices",
        path: "/api/invoices",
        label: "Invoice",
        required: ["patient_id", "invoice_number", "total"],
        writers: [Admin, Receptionist],
        deleters: [Admin],
        defaults: {
            "subtotal": 0,
            "tax": 0,
            "discount": 0,
            "amount_paid": 0,
            "currency": "UGX",
            "status": "pending",
        },
        fields: {
            patient_id: String,
            patient_name: String,
            invoice_number: String,
            invoice_date: String,
            due_date: String,
            items: Value,
            subtotal: f64,
            tax: f64,
            discount: f64,
            total: f64,
            amount_paid: f64,
            balance: f64,
            currency: String,
            status: String,
            notes: String,
        },
    }
}

define_entity! {
    pub struct MedicalVisit / MedicalVisitChanges {
        table: "medical_visits",
        path: "/api/medical-visits",
        label: "Medical visit",
        required: ["patient_id", "doctor_id"],
        writers: [Admin, Doctor, Nurse],
        deleters: [Admin],
        defaults: { "visit_type": "consultation", "status": "completed" },
        fields: {
            patient_id: String,
            doctor_id: String,
            visit_date: String,
            visit_type: String,
            chief_complaint: String,
            diagnosis: String,
            treatment_plan: String,
            notes: String,
            status: String,
        },
    }
}

define_entity! {
    /// The self-service slice of a user row, edited via `PUT /api/auth/profile`
    pub struct UserProfile / ProfileChanges {
        table: "users",
        path: "/api/auth/profile",
        label: "User",
        required: ["name"],
        writers: [],
        defaults: {},
        fields: {
            name: String,
            department: String,
            profile_image: String,
        },
    }
}

/// Tables the persistence layer accepts
pub const TABLES: &[&str] = &[
    "users",
    "patients",
    "doctors",
    "appointments",
    "triage_records",
    "vital_signs",
    "imaging_studies",
    "antenatal_visits",
    "surgeries",
    "vaccinations",
    "lab_tests",
    "prescriptions",
    "inventory",
    "dispensing_records",
    "payments",
    "invoices",
    "medical_visits",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{build_new, parse_changes, Entity};
    use chrono::Utc;
    use serde_json::json;

    fn assert_registered<E: Entity>() {
        assert!(TABLES.contains(&E::TABLE), "{} missing from TABLES", E::TABLE);
        for required in E::REQUIRED {
            assert!(E::FIELDS.contains(required), "{}.{} not a field", E::TABLE, required);
        }
        for (field, _) in E::defaults() {
            assert!(E::FIELDS.contains(&field), "{}.{} default not a field", E::TABLE, field);
        }
    }

    #[test]
    fn every_entity_is_consistent() {
        assert_registered::<Patient>();
        assert_registered::<Doctor>();
        assert_registered::<Appointment>();
        assert_registered::<TriageRecord>();
        assert_registered::<VitalSign>();
        assert_registered::<ImagingStudy>();
        assert_registered::<AntenatalVisit>();
        assert_registered::<Surgery>();
        assert_registered::<Vaccination>();
        assert_registered::<LabTest>();
        assert_registered::<Prescription>();
        assert_registered::<InventoryItem>();
        assert_registered::<DispensingRecord>();
        assert_registered::<Payment>();
        assert_registered::<Invoice>();
        assert_registered::<MedicalVisit>();
        assert_registered::<UserProfile>();
    }

    #[test]
    fn reserved_column_names_map_through() {
        assert!(Appointment::FIELDS.contains(&"type"));
        let changes = parse_changes::<Appointment>(json!({
            "patient_id": "p-1",
            "doctor_id": "d-1",
            "date": "2025-03-01",
            "type": "follow_up"
        }))
        .unwrap();
        let record = build_new::<Appointment>(changes, "a-1", "clinic-a", Utc::now()).unwrap();
        assert_eq!(record["type"], "follow_up");
        assert_eq!(record["status"], "scheduled");
    }

    #[test]
    fn vital_signs_keep_numeric_readings() {
        let changes = parse_changes::<VitalSign>(json!({
            "patient_id": "p-1",
            "temperature": 37.2,
            "heart_rate": 72,
            "blood_pressure": "120/80"
        }))
        .unwrap();
        let record = build_new::<VitalSign>(changes, "v-1", "clinic-a", Utc::now()).unwrap();
        assert_eq!(record["heart_rate"], 72);
        assert_eq!(record["blood_pressure"], "120/80");
        assert_eq!(record["oxygen_saturation"], Value::Null);

        assert!(parse_changes::<VitalSign>(json!({ "heart_rate": "fast" })).is_err());
    }

    #[test]
    fn profile_slice_has_no_deleters() {
        assert!(UserProfile::DELETERS.is_empty());
        assert_eq!(UserProfile::TABLE, "users");
    }

    #[test]
    fn json_columns_accept_structures() {
        let changes = parse_changes::<Invoice>(json!({
            "patient_id": "p-1",
            "invoice_number": "INV-001",
            "total": 150.5,
            "items": [{ "description": "Consultation", "amount": 150.5 }]
        }))
        .unwrap();
        let record = build_new::<Invoice>(changes, "i-1", "clinic-a", Utc::now()).unwrap();
        assert_eq!(record["items"][0]["description"], "Consultation");
        assert_eq!(record["currency"], "UGX");
    }
}
