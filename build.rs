fn main() {
    // ESP-IDF link arguments are only needed for the device build; host
    // builds and tests compile the library without the IDF toolchain.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
