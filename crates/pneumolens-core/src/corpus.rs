//! Reference passages used as retrieval context.
//!
//! The corpus is compiled in and never changes at runtime; a passage's
//! position is its index in the embedding index.

pub const REFERENCE_CORPUS: &[&str] = &[
    "Pneumonia is an infection that inflames the air sacs in one or both lungs.",
    "The alveoli may fill with fluid or pus, causing cough, fever, chills, and difficulty breathing.",
    "Bacterial pneumonia is commonly caused by Streptococcus pneumoniae and Haemophilus influenzae.",
    "Viral pneumonia can be caused by influenza virus, RSV, or SARS-CoV-2.",
    "Fungal pneumonia occurs more often in people with weakened immune systems.",
    "Symptoms of pneumonia include cough, fever, chills, chest pain, fatigue, and shortness of breath.",
    "Risk factors include age below 2 or above 65, chronic diseases, smoking, and weak immunity.",
    "Diagnosis involves chest X-ray, blood tests, sputum tests, and physical examination.",
    "Treatment depends on the cause: antibiotics for bacterial, antivirals for viral, and antifungals for fungal pneumonia.",
    "Vaccination, good hygiene, and a healthy lifestyle help prevent pneumonia.",
    "Complications of pneumonia include respiratory failure, sepsis, lung abscess, and pleural effusion.",
];

pub fn corpus_len() -> usize {
    REFERENCE_CORPUS.len()
}
