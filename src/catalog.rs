//! Fixed portal vocabulary: workbook labels, concept names and period codes.

/// Workbook labels filled into the ISR section, in form order.
pub const ISR_LABELS: [&str; 6] = [
    "Ingresos nominales facturados",
    "Total de ingresos acumulados",
    "Base gravable del pago provisional",
    "Impuesto del periodo",
    "Total ISR retenido del periodo",
    "ISR a cargo",
];

/// Workbook labels filled into the IVA section, in form order.
pub const IVA_LABELS: [&str; 12] = [
    "Actividades gravadas a la tasa del 16%",
    "Actividades gravadas a la tasa del 8%",
    "Actividades gravadas a la tasa del 0% otros",
    "Actividades exentas",
    "Actividades no objeto de impuesto",
    "IVA a cargo a la tasa del 16% y 8%",
    "Total IVA Trasladado",
    "IVA retenido a favor",
    "IVA acreditable del periodo",
    "Cantidad a cargo",
    "IVA a cargo",
    "IVA a favor",
];

/// Candidates for the expected income figure, most specific first.
pub const EXPECTED_INCOME_LABELS: [&str; 4] = [
    "Base gravable del pago provisional",
    "Ingresos cobrados y amparados por factura del mes",
    "Total de ingresos acumulados",
    "Ingresos nominales facturados",
];

pub const ISR_DUE_LABEL: &str = "ISR a cargo";
pub const IVA_DUE_LABEL: &str = "IVA a cargo";

/// Workbook value entered in the copropiedad discounts popup.
pub const COPROPIEDAD_DISCOUNTS_LABEL: &str =
    "Descuentos devoluciones y bonificaciones de integrantes por copropiedad";

/// Concept for a decrease disclosure. The portal has shipped both spellings.
pub const DECREASE_CONCEPTS: [&str; 2] = [
    "Ingresos facturados pendientes de cancelación con aceptación del receptor",
    "Ingresos facturados pendientes de cancelacion con aceptacion del receptor",
];

pub const INCREASE_CONCEPTS: [&str; 1] = ["Ingresos no considerados en el prellenado"];

/// Workbook activity label to the concept picked in the total-percibidos popup.
pub const ACTIVITY_CONCEPTS: [(&str, &str); 3] = [
    ("Actividad empresarial", "Actividad empresarial"),
    (
        "Actividad profesional (honorarios)",
        "Servicios profesionales (Honorarios)",
    ),
    (
        "Uso o goce temporal de bienes (arrendamiento)",
        "Uso o goce temporal de bienes",
    ),
];

pub const DEFAULT_DECLARATION_TYPE: &str = "Normal";

const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Portal option value for a workbook periodicity code. Unknown codes are monthly.
pub fn periodicity_letter(code: u32) -> &'static str {
    match code {
        1 => "M",
        3 => "T",
        4 => "Q",
        5 => "S",
        6 => "L",
        7 => "J",
        8 => "Y",
        9 => "N",
        _ => "M",
    }
}

/// Spanish month name shown by the period dropdown.
pub fn month_name(month: u32) -> Option<&'static str> {
    month
        .checked_sub(1)
        .and_then(|idx| MONTH_NAMES.get(idx as usize))
        .copied()
}
