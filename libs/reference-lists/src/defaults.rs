//! Standard taxonomies seeded into new establishments.

use crate::models::ListItem;

type Entry = (&'static str, &'static str, Option<&'static str>, Option<&'static str>);

const INTERVENTION_TYPES: &[Entry] = &[
    ("plumbing", "Plomberie", Some("droplet"), Some("#2196f3")),
    ("electricity", "Électricité", Some("zap"), Some("#ffc107")),
    ("heating", "Chauffage / climatisation", Some("thermometer"), Some("#ff5722")),
    ("carpentry", "Menuiserie", Some("hammer"), Some("#795548")),
    ("painting", "Peinture", Some("paintbrush"), Some("#9c27b0")),
    ("cleaning", "Nettoyage", Some("sparkles"), Some("#00bcd4")),
    ("furniture", "Mobilier", Some("armchair"), Some("#8d6e63")),
    ("it", "Informatique / TV", Some("monitor"), Some("#607d8b")),
    ("other", "Autre", None, Some("#9e9e9e")),
];

const INTERVENTION_STATUSES: &[Entry] = &[
    ("todo", "À faire", Some("circle"), Some("#9e9e9e")),
    ("in_progress", "En cours", Some("loader"), Some("#2196f3")),
    ("ordering", "En commande", Some("package"), Some("#ff9800")),
    ("completed", "Terminée", Some("check-circle"), Some("#4caf50")),
    ("cancelled", "Annulée", Some("x-circle"), Some("#f44336")),
];

const PRIORITIES: &[Entry] = &[
    ("low", "Basse", None, Some("#4caf50")),
    ("normal", "Normale", None, Some("#2196f3")),
    ("high", "Haute", None, Some("#ff9800")),
    ("urgent", "Urgente", Some("alert-triangle"), Some("#f44336")),
];

const ROOM_STATUSES: &[Entry] = &[
    ("available", "Disponible", None, Some("#4caf50")),
    ("occupied", "Occupée", None, Some("#2196f3")),
    ("cleaning", "En nettoyage", None, Some("#00bcd4")),
    ("maintenance", "En maintenance", None, Some("#ff9800")),
    ("blocked", "Bloquée", None, Some("#f44336")),
];

const ROOM_TYPES: &[Entry] = &[
    ("single", "Simple", None, None),
    ("double", "Double", None, None),
    ("twin", "Twin", None, None),
    ("suite", "Suite", None, None),
    ("family", "Familiale", None, None),
];

const LOCATIONS: &[Entry] = &[
    ("room", "Chambre", Some("bed"), None),
    ("bathroom", "Salle de bain", Some("bath"), None),
    ("corridor", "Couloir", None, None),
    ("lobby", "Hall / réception", None, None),
    ("restaurant", "Restaurant", Some("utensils"), None),
    ("kitchen", "Cuisine", None, None),
    ("technical", "Local technique", Some("wrench"), None),
    ("outside", "Extérieur", Some("trees"), None),
];

const TECHNICIAN_SKILLS: &[Entry] = &[
    ("plumbing", "Plomberie", None, None),
    ("electricity", "Électricité", None, None),
    ("hvac", "Génie climatique", None, None),
    ("carpentry", "Menuiserie", None, None),
    ("painting", "Peinture", None, None),
    ("locksmith", "Serrurerie", None, None),
];

const DEPARTMENTS: &[Entry] = &[
    ("maintenance", "Maintenance", None, None),
    ("housekeeping", "Gouvernance", None, None),
    ("reception", "Réception", None, None),
    ("restaurant", "Restauration", None, None),
    ("management", "Direction", None, None),
];

const DEFAULT_LISTS: &[(&str, &[Entry])] = &[
    ("interventionTypes", INTERVENTION_TYPES),
    ("interventionStatuses", INTERVENTION_STATUSES),
    ("priorities", PRIORITIES),
    ("roomStatuses", ROOM_STATUSES),
    ("roomTypes", ROOM_TYPES),
    ("locations", LOCATIONS),
    ("technicianSkills", TECHNICIAN_SKILLS),
    ("departments", DEPARTMENTS),
];

/// Every standard list, items ordered as declared.
pub fn default_lists() -> Vec<(String, Vec<ListItem>)> {
    DEFAULT_LISTS
        .iter()
        .map(|(key, entries)| ((*key).to_string(), build_items(entries)))
        .collect()
}

fn build_items(entries: &[Entry]) -> Vec<ListItem> {
    entries
        .iter()
        .enumerate()
        .map(|(position, (value, label, icon, color))| {
            let mut item = ListItem::new(*value, *label).with_order(position as i32);
            if let Some(icon) = icon {
                item = item.with_icon(*icon);
            }
            if let Some(color) = color {
                item = item.with_color(*color);
            }
            item
        })
        .collect()
}
