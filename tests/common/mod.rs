//! In-memory SAT portal shared by the wizard integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use action_locator::{FieldMapping, WaitBudgets};
use action_primitives::ActionTimings;
use async_trait::async_trait;
use cdp_adapter::memory::{Document, DomEvent, El};
use cdp_adapter::{DomPort, MemoryDom, NodeId};
use parking_lot::Mutex;
use sat_declaration::catalog::{
    ACTIVITY_CONCEPTS, COPROPIEDAD_DISCOUNTS_LABEL, DECREASE_CONCEPTS, INCREASE_CONCEPTS,
};
use sat_declaration::sources::Credentials;
use sat_declaration::values::{ExternalValueSet, Period};
use sat_declaration::{EngineError, PhaseTimings, RunMode, RunRequest, SessionLauncher, WizardSettings};

pub const PORTAL_URL: &str = "https://pstcdypisr.clouda.sat.gob.mx/";
const LOGIN_URL: &str = "https://login.siat.sat.gob.mx/nidp/app/login";
const YES_NO: &[(&str, &str)] = &[("No", "No"), ("Sí", "Sí")];

const MAPPING: &str = r##"{
    "_comment": "selectors of the in-memory portal",
    "_login_e_firma_button": ["#btnFiel"],
    "_login_password_input": ["#privateKeyPassword"],
    "_nav_presentar_declaracion": ["#presentar", "button=Presentar declaración"],
    "_nav_cerrar": ["#logout"],
    "initial_ejercicio": ["select[id*='EjercicioFiscal']"],
    "initial_periodicidad": ["label=Periodicidad"],
    "initial_periodo": ["select[id*='Periodo']"],
    "initial_tipo_declaracion": ["select[id*='TipoDeclaracion']"],
    "_btn_siguiente": ["#siguiente"],
    "_select_obligation_isr": ["#chkIsr"],
    "_summary_isr_a_pagar": ["#sum-isr"],
    "_summary_iva_a_pagar": ["#sum-iva"],
    "_summary_total_a_pagar": ["#sum-total"],
    "_btn_enviar_declaracion": ["#enviar"]
}"##;

/// Figures the portal summary shows before submission.
#[derive(Clone, Copy)]
pub struct Summary {
    pub isr: &'static str,
    pub iva: &'static str,
    pub total: &'static str,
}

pub const MATCHING_SUMMARY: Summary = Summary {
    isr: "$1,200.00",
    iva: "$300.00",
    total: "$1,500.00",
};

pub fn mapping() -> FieldMapping {
    FieldMapping::from_json_str(MAPPING).unwrap()
}

/// March 2025, monthly, with the income matching the pre-filled total.
pub fn values() -> ExternalValueSet {
    ExternalValueSet::new(Period {
        year: Some(2025),
        month: Some(3),
        periodicidad: Some(1),
    })
    .with_amount("Base gravable del pago provisional", 1000.0)
    .with_amount("Actividad empresarial", 1000.0)
    .with_amount("ISR a cargo", 1200.0)
    .with_amount("IVA a cargo", 300.0)
}

pub fn request(mode: RunMode) -> RunRequest {
    RunRequest {
        mode,
        values: values(),
        credentials: Credentials {
            cer_path: PathBuf::from("/fiel/EKU9003173C9.cer"),
            key_path: PathBuf::from("/fiel/EKU9003173C9.key"),
            password: "12345678a".into(),
            rfc: "EKU9003173C9".into(),
        },
        mapping: mapping(),
        settings: WizardSettings {
            portal_url: PORTAL_URL.into(),
            totals_tolerance: 1.0,
            timings: PhaseTimings::fast(),
        },
        retry_wait: Duration::from_millis(10),
        budgets: WaitBudgets::fast(),
        action_timings: ActionTimings::fast(),
    }
}

/// Hands out prepared pages in order and remembers what it launched.
#[derive(Clone, Default)]
pub struct Pages {
    queue: Arc<Mutex<Vec<MemoryDom>>>,
    launched: Arc<Mutex<Vec<MemoryDom>>>,
}

impl Pages {
    pub fn new(mut pages: Vec<MemoryDom>) -> Self {
        pages.reverse();
        Self {
            queue: Arc::new(Mutex::new(pages)),
            launched: Arc::default(),
        }
    }

    pub fn launched(&self) -> Vec<MemoryDom> {
        self.launched.lock().clone()
    }
}

#[async_trait]
impl SessionLauncher for Pages {
    async fn launch(&self) -> Result<Box<dyn DomPort>, EngineError> {
        let page = self
            .queue
            .lock()
            .pop()
            .ok_or_else(|| EngineError::Prerequisite("no page left".into()))?;
        self.launched.lock().push(page.clone());
        Ok(Box::new(page))
    }
}

/// Portal answering 503 to the first request.
pub fn unavailable_portal() -> MemoryDom {
    let mut doc = Document::new(PORTAL_URL);
    doc.status = Some(503);
    doc.add(El::new("a").text("Salir").id("logout"));
    MemoryDom::new(doc)
}

/// The whole wizard: e.firma login, home, period form, pre-fill pop-up,
/// obligations, the ISR income tab, tax sections and the summary.
pub fn portal(summary: Summary) -> MemoryDom {
    let mut doc = Document::new(LOGIN_URL);

    let fiel = doc.add(El::button("e.firma").id("btnFiel"));
    let login = doc.add(El::new("form").hidden().children([
        El::new("input").attr("type", "file").id("fileCertificate"),
        El::new("input").attr("type", "file").id("filePrivateKey"),
        El::new("input").attr("type", "password").id("privateKeyPassword"),
        El::new("input").attr("type", "submit").attr("value", "Contraseña"),
        El::new("input").attr("type", "submit").attr("value", "Enviar").id("submit"),
    ]));
    let home = doc.add(El::new("div").hidden().children([
        El::new("h2").text("Bienvenido"),
        El::button("Presentar declaración").id("presentar"),
        El::new("a").text("Salir").id("logout"),
    ]));
    doc.on_click(fiel, move |d| d.show(login));
    on_click_id(&mut doc, "submit", move |d| {
        d.url = PORTAL_URL.to_string();
        d.hide(login);
        d.show(home);
    });

    let config = doc.add(El::new("div").id("configuracion").hidden().children([
        El::new("label").text("Ejercicio"),
        El::select("cmbEjercicioFiscal", &[("", "Selecciona"), ("2024", "2024"), ("2025", "2025")]),
        El::new("table").child(El::row([
            El::new("span").text("Periodicidad"),
            El::select("cmbPeriodicidad", &[("", "Selecciona"), ("M", "Mensual"), ("T", "Trimestral")]),
        ])),
        El::select("cmbPeriodo", &[("", "Selecciona"), ("1", "Enero"), ("3", "Marzo")]),
        El::select("cmbTipoDeclaracion", &[("", "Selecciona"), ("N", "Normal")]),
        El::button("Siguiente").id("siguiente"),
    ]));
    on_click_id(&mut doc, "presentar", move |d| d.show(config));

    let prefill = doc.add(El::new("div").class("prefill").hidden().children([
        El::new("p").text("Se precargó la información de tus facturas"),
        El::button("CERRAR").id("prefill-close"),
    ]));
    on_click_id(&mut doc, "siguiente", move |d| {
        d.hide(config);
        d.show(prefill);
    });

    let obligations = doc.add(El::new("div").id("obligaciones").hidden().children([
        El::new("label").text("ISR personas morales"),
        El::new("input").attr("type", "checkbox").id("chkIsr"),
    ]));
    on_click_id(&mut doc, "prefill-close", move |d| {
        d.hide(prefill);
        d.show(obligations);
    });

    let income = income_tab(&mut doc);
    let sections = doc.add(El::new("div").id("secciones").hidden().child(
        El::new("table").children([
            El::row([El::new("span").text("Base gravable del pago provisional"), El::input("base")]),
            El::row([El::new("span").text("ISR a cargo"), El::input("isr-cargo")]),
            El::row([El::new("span").text("IVA a cargo"), El::input("iva-cargo")]),
        ]),
    ));
    let resumen = doc.add(El::new("div").id("resumen").hidden().children([
        El::new("span").id("sum-isr").text(summary.isr),
        El::new("span").id("sum-iva").text(summary.iva),
        El::new("span").id("sum-total").text(summary.total),
        El::button("Enviar declaración").id("enviar"),
    ]));
    on_click_id(&mut doc, "chkIsr", move |d| {
        d.show(income);
        d.show(sections);
        d.show(resumen);
    });
    on_click_id(&mut doc, "enviar", |d| {
        d.add(El::new("h2").text("Acuse de recibo"));
    });

    MemoryDom::new(doc)
}

fn income_tab(doc: &mut Document) -> NodeId {
    let discounts = doc.add(El::new("div").attr("role", "dialog").hidden().children([
        El::row([
            El::new("span").text(COPROPIEDAD_DISCOUNTS_LABEL),
            El::input("desc-amount"),
        ]),
        El::button("CERRAR").id("desc-close"),
    ]));
    on_click_id(doc, "desc-close", move |d| d.hide(discounts));
    let decrease = capture_dialog(doc, "dis", &DECREASE_CONCEPTS);
    let increase = capture_dialog(doc, "adi", &INCREASE_CONCEPTS);
    let activities: Vec<&str> = ACTIVITY_CONCEPTS.iter().map(|(_, concept)| *concept).collect();
    let perceived = capture_dialog(doc, "tot", &activities);

    let tab = doc.add(El::new("div").id("tab457maincontainer1").hidden());
    let table = doc.append(tab, El::new("table"));
    doc.append(
        table,
        question("*¿Los ingresos fueron obtenidos a través de copropiedad?", "copropiedad"),
    );
    doc.append(
        table,
        El::row([
            El::new("span").text("Total de ingresos efectivamente cobrados"),
            El::new("input")
                .attr("type", "text")
                .attr("readonly", "readonly")
                .attr("value", "$1,000.00"),
        ]),
    );
    capture_row(doc, table, "Descuentos, devoluciones y bonificaciones", discounts);
    doc.append(table, question("¿Tienes ingresos a disminuir?", "q-dis"));
    capture_row(doc, table, "*Ingresos a disminuir", decrease);
    doc.append(table, question("¿Tienes ingresos adicionales?", "q-adi"));
    capture_row(doc, table, "*Ingresos adicionales", increase);
    capture_row(doc, table, "Total de ingresos percibidos por la actividad", perceived);
    tab
}

fn question(text: &str, id: &str) -> El {
    El::row([El::new("span").text(text), El::select(id, YES_NO)])
}

fn capture_row(doc: &mut Document, table: NodeId, label: &str, dialog: NodeId) {
    let row = doc.append(
        table,
        El::new("tr").child(El::new("td").child(El::new("span").text(label))),
    );
    let cell = doc.append(row, El::new("td"));
    let button = doc.append(cell, El::button("CAPTURAR"));
    doc.on_click(button, move |d| d.show(dialog));
}

/// Line-capture dialog: AGREGAR opens the editor, GUARDAR appends
/// `<concept> <amount>` to `#<id>-lines`.
fn capture_dialog(doc: &mut Document, id: &str, concepts: &[&str]) -> NodeId {
    let options: Vec<(&str, &str)> = concepts.iter().map(|c| (*c, *c)).collect();
    let dialog = doc.add(
        El::new("div")
            .attr("role", "dialog")
            .id(id)
            .hidden()
            .children([
                El::button("AGREGAR").id(&format!("{id}-add")),
                El::new("table").id(&format!("{id}-lines")),
                El::new("div").id(&format!("{id}-editor")).hidden().children([
                    El::row([
                        El::new("span").text("Concepto"),
                        El::select(&format!("{id}-concept"), &options),
                    ]),
                    El::row([El::new("span").text("Importe"), El::input(&format!("{id}-amount"))]),
                    El::button("GUARDAR").id(&format!("{id}-save")),
                ]),
                El::button("CERRAR").id(&format!("{id}-close")),
            ]),
    );
    let node = |doc: &Document, suffix: &str| doc.by_id(&format!("{id}-{suffix}"));
    let (Some(editor), Some(lines), Some(concept), Some(amount)) = (
        node(doc, "editor"),
        node(doc, "lines"),
        node(doc, "concept"),
        node(doc, "amount"),
    ) else {
        panic!("capture dialog {id} is incomplete");
    };
    on_click_id(doc, &format!("{id}-add"), move |d| d.show(editor));
    let line_id = format!("{id}-line");
    let mut saved = 0;
    on_click_id(doc, &format!("{id}-save"), move |d| {
        let line = format!(
            "{} {}",
            d.value_of(concept).unwrap_or_default(),
            d.value_of(amount).unwrap_or_default()
        );
        let cell = El::new("td").class("line").id(&format!("{line_id}-{saved}")).text(&line);
        d.append(lines, El::new("tr").child(cell));
        saved += 1;
        d.set_value(amount, "");
        d.hide(editor);
    });
    on_click_id(doc, &format!("{id}-close"), move |d| d.hide(dialog));
    dialog
}

fn on_click_id(doc: &mut Document, id: &str, hook: impl FnMut(&mut Document) + Send + 'static) {
    let node = doc
        .by_id(id)
        .unwrap_or_else(|| panic!("no #{id} in the portal"));
    doc.on_click(node, hook);
}

pub fn value(dom: &MemoryDom, id: &str) -> Option<String> {
    dom.with_doc(|d| d.by_id(id).and_then(|node| d.value_of(node)))
}

pub fn clicked(dom: &MemoryDom, id: &str) -> bool {
    let Some(node) = dom.with_doc(|d| d.by_id(id)) else {
        return false;
    };
    dom.events().contains(&DomEvent::Clicked(node))
}

/// Lines saved through `#<id>`'s GUARDAR, read straight from the document
/// so it also works once the session is closed.
pub fn saved_lines(dom: &MemoryDom, id: &str) -> Vec<String> {
    dom.with_doc(|d| {
        (0..)
            .map_while(|n| d.by_id(&format!("{id}-line-{n}")))
            .map(|node| d.text_of(node))
            .collect()
    })
}
